//! Root finding for the single-diode model parameters.
//!
//! # Overview
//!
//! The five unknowns `a, Il, Io, Rs, Rsh` of the single-diode model are the root of five
//! equations built from the data sheet (see [`residuals`]):
//!
//! 1. short circuit: the model passes through `(0, Isc)`
//! 2. open circuit: the model passes through `(Voc, 0)`
//! 3. maximum power point: the model passes through `(Vmp, Imp)`
//! 4. zero power slope at `(Vmp, Imp)`: `dP/dV = 0`
//! 5. an [`AuxiliaryRelation`]: either the open circuit at the elevated temperature
//!    `Tref + 10 K`, where the open-circuit voltage is extrapolated by `beta_Voc` and the light
//!    current by `alpha_Isc`, or a fixed technology ratio `Rsh / Rs` for data sheets whose
//!    temperature coefficients admit no positive shunt resistance
//!
//! # Parameter Spaces
//!
//! The physical (external) parameters are reported by [`ParameterVector`](crate::ParameterVector).
//! Newton iterations work with internal coordinates:
//!
//! ```text
//! x = [a, Il, ln Io, Rs, Rsh]
//! ```
//!
//! Saturation current spans many orders of magnitude between technologies and stays positive
//! in log scale. The Jacobian returned by [`residuals::ResidualSystem::jacobian`] is taken with
//! respect to the internal coordinates, so `∂F/∂(ln Io) = Io ∂F/∂Io`.
//!
//! # Workflow
//!
//! 1. [`seeds`] produces a bounded, ordered list of initial guesses for the cell technology.
//! 2. [`newton::NewtonDriver`] runs a damped Newton iteration from each guess in turn:
//!    the step is the solution of `J Δx = -F` by [`lu::LuFactorization`], and it is halved until
//!    the iterate is admissible (`a > 0`, `Il > 0`, `Rs ≥ 0`, `Rsh > 0`) and the residual norm
//!    does not grow too much. An iterate above the resistance ceilings `Rs ≤ Voc / Isc`,
//!    `Rsh ≤ 10⁶ Voc / Isc` ends the attempt.
//! 3. A converged root passes physical sanity checks or the next guess is tried.
//!
//! Every attempt is recorded in a [`newton::FitTrace`], so failures are reproducible.

pub mod lu;
pub use lu::LuFactorization;

pub mod newton;
pub use newton::{AttemptOutcome, FitTrace, NewtonDriver, NewtonOptions};

pub mod residuals;
pub use residuals::{AuxiliaryRelation, ResidualSystem};

pub mod seeds;
pub use seeds::{FixedCandidates, InitialGuess, InitialGuessTrait, TechnologySearch};

#[cfg(test)]
pub trait DualFloat: hyperdual::Float {}
#[cfg(test)]
impl<T> DualFloat for T where T: hyperdual::Float {}
#[cfg(not(test))]
pub trait DualFloat: num_traits::Float {}
#[cfg(not(test))]
impl<T> DualFloat for T where T: num_traits::Float {}

/// Float-like type the residuals are generic over, dual numbers in tests
pub trait LikeFloat: DualFloat + Copy {
    fn constant(value: f64) -> Self {
        <Self as num_traits::NumCast>::from(value).unwrap_or_else(Self::nan)
    }

    fn real_part(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

impl<T> LikeFloat for T where T: DualFloat + Copy {}
