use crate::error::{LinearSolveError, ResidualError};
use crate::params::{NPARAMS, ParameterVector, SanityViolation};
use crate::solver::lu::{DEFAULT_PIVOT_TOLERANCE, LuFactorization};
use crate::solver::residuals::{AuxiliaryRelation, Evaluation, ResidualSystem};

use ndarray::aview1;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

/// Damped Newton iteration settings
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename = "Newton")]
pub struct NewtonOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub max_step_halvings: usize,
    pub max_residual_growth: f64,
    pub max_growth_steps: usize,
    pub pivot_tolerance: f64,
}

impl NewtonOptions {
    /// Create a new [NewtonOptions].
    ///
    /// # Arguments
    /// - `max_iterations`: maximum number of Newton steps from a single initial guess
    /// - `tolerance`: convergence threshold on the Euclidean norm of the residuals, A
    /// - `max_step_halvings`: how many times a step may be halved before giving up on it
    /// - `max_residual_growth`: largest accepted ratio of the new to the current residual norm
    /// - `max_growth_steps`: number of consecutive steps with growing residual norm treated as
    ///   divergence
    /// - `pivot_tolerance`: relative pivot threshold of the LU factorization
    pub fn new(
        max_iterations: usize,
        tolerance: f64,
        max_step_halvings: usize,
        max_residual_growth: f64,
        max_growth_steps: usize,
        pivot_tolerance: f64,
    ) -> Self {
        assert!(max_iterations > 0, "max_iterations must be positive");
        assert!(
            tolerance > 0.0 && tolerance.is_finite(),
            "tolerance must be positive and finite"
        );
        assert!(
            max_residual_growth >= 1.0 && max_residual_growth.is_finite(),
            "max_residual_growth must be finite and at least unity"
        );
        assert!(max_growth_steps > 0, "max_growth_steps must be positive");
        assert!(
            pivot_tolerance >= 0.0 && pivot_tolerance < 1.0,
            "pivot_tolerance must be in [0, 1)"
        );
        Self {
            max_iterations,
            tolerance,
            max_step_halvings,
            max_residual_growth,
            max_growth_steps,
            pivot_tolerance,
        }
    }

    #[inline]
    pub fn default_max_iterations() -> usize {
        300
    }

    #[inline]
    pub fn default_tolerance() -> f64 {
        1e-7
    }

    #[inline]
    pub fn default_max_step_halvings() -> usize {
        30
    }

    #[inline]
    pub fn default_max_residual_growth() -> f64 {
        2.0
    }

    #[inline]
    pub fn default_max_growth_steps() -> usize {
        5
    }

    #[inline]
    pub fn default_pivot_tolerance() -> f64 {
        DEFAULT_PIVOT_TOLERANCE
    }
}

impl Default for NewtonOptions {
    fn default() -> Self {
        Self::new(
            Self::default_max_iterations(),
            Self::default_tolerance(),
            Self::default_max_step_halvings(),
            Self::default_max_residual_growth(),
            Self::default_max_growth_steps(),
            Self::default_pivot_tolerance(),
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum DivergenceReason {
    /// Initial guess is not finite, not admissible or above the resistance ceilings
    InadmissibleSeed,
    /// Residuals cannot be evaluated at the initial guess
    ResidualOverflow(ResidualError),
    /// No damped step stays in the admissible region, or the accepted step crosses a resistance
    /// ceiling
    LeftAdmissibleRegion,
    /// Residual norm grew for too many consecutive steps
    ResidualGrowth,
}

/// Final state of a single Newton attempt
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum AttemptOutcome {
    Converged,
    SingularJacobian(LinearSolveError),
    Diverged(DivergenceReason),
    MaxIterationsExceeded,
    PhysicallyInvalidRoot(SanityViolation),
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::SingularJacobian(error) => write!(f, "singular jacobian: {error}"),
            Self::Diverged(DivergenceReason::InadmissibleSeed) => {
                write!(f, "diverged: inadmissible initial guess")
            }
            Self::Diverged(DivergenceReason::ResidualOverflow(error)) => {
                write!(f, "diverged: {error}")
            }
            Self::Diverged(DivergenceReason::LeftAdmissibleRegion) => {
                write!(f, "diverged: left the admissible region")
            }
            Self::Diverged(DivergenceReason::ResidualGrowth) => {
                write!(f, "diverged: residual norm keeps growing")
            }
            Self::MaxIterationsExceeded => write!(f, "maximum number of iterations exceeded"),
            Self::PhysicallyInvalidRoot(violation) => {
                write!(f, "physically invalid root: {violation}")
            }
        }
    }
}

/// Record of a single Newton attempt
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub relation: AuxiliaryRelation,
    pub candidate: usize,
    pub outcome: AttemptOutcome,
    pub iterations: usize,
    /// Residual norm of the last accepted iterate, `NaN` if the initial guess was not evaluated
    pub residual_norm: f64,
}

/// Every attempt of a fit in the order they were made
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FitTrace {
    pub attempts: Vec<AttemptRecord>,
}

impl FitTrace {
    pub fn last_outcome(&self) -> Option<AttemptOutcome> {
        self.attempts.last().map(|record| record.outcome)
    }

    pub fn total_iterations(&self) -> usize {
        self.attempts.iter().map(|record| record.iterations).sum()
    }
}

/// Converged and sane root with the attempts made to find it
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    pub parameters: ParameterVector,
    pub trace: FitTrace,
}

/// Transient state of one attempt
struct SolveState {
    x: [f64; NPARAMS],
    evaluation: Evaluation,
    iteration: usize,
    last_step_norm: f64,
    growth_steps: usize,
}

enum DriverState {
    Seeded(usize),
    Iterating(usize, SolveState),
    Converged(usize, SolveState),
    /// Attempt failed, the next candidate is tried if any
    Retry(AttemptRecord),
    Failed,
}

enum Step {
    Continue,
    Done(AttemptOutcome),
}

/// Damped Newton root finder with retries over a bounded list of initial guesses
///
/// Each attempt is a state machine `Seeded → Iterating → {Converged | Diverged |
/// MaxIterationsExceeded}`. A failed attempt, or a converged root rejected by the sanity check,
/// moves on to the next candidate; when candidates are exhausted the driver is `Failed`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewtonDriver {
    options: NewtonOptions,
}

impl NewtonDriver {
    pub fn new(options: NewtonOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &NewtonOptions {
        &self.options
    }

    /// Find a root accepted by `sanity`
    ///
    /// Returns the trace of all attempts if every candidate fails.
    pub fn solve<S>(
        &self,
        system: &ResidualSystem,
        candidates: &[ParameterVector],
        sanity: S,
    ) -> Result<Solution, FitTrace>
    where
        S: Fn(&ParameterVector) -> Result<(), SanityViolation>,
    {
        let mut trace = FitTrace::default();
        let mut state = DriverState::Seeded(0);
        loop {
            state = match state {
                DriverState::Seeded(candidate) => match candidates.get(candidate) {
                    Some(seed) => match Self::seed(system, seed) {
                        Ok(solve_state) => DriverState::Iterating(candidate, solve_state),
                        Err(outcome) => DriverState::Retry(AttemptRecord {
                            relation: system.relation(),
                            candidate,
                            outcome,
                            iterations: 0,
                            residual_norm: f64::NAN,
                        }),
                    },
                    None => DriverState::Failed,
                },
                DriverState::Iterating(candidate, mut solve_state) => {
                    match self.step(system, &mut solve_state) {
                        Step::Continue => DriverState::Iterating(candidate, solve_state),
                        Step::Done(AttemptOutcome::Converged) => {
                            DriverState::Converged(candidate, solve_state)
                        }
                        Step::Done(outcome) => DriverState::Retry(AttemptRecord {
                            relation: system.relation(),
                            candidate,
                            outcome,
                            iterations: solve_state.iteration,
                            residual_norm: solve_state.evaluation.norm,
                        }),
                    }
                }
                DriverState::Converged(candidate, solve_state) => {
                    let parameters = ParameterVector::from_internal(&solve_state.x);
                    let mut record = AttemptRecord {
                        relation: system.relation(),
                        candidate,
                        outcome: AttemptOutcome::Converged,
                        iterations: solve_state.iteration,
                        residual_norm: solve_state.evaluation.norm,
                    };
                    match sanity(&parameters) {
                        Ok(()) => {
                            debug!(
                                relation = %record.relation,
                                candidate,
                                iterations = record.iterations,
                                "converged"
                            );
                            trace.attempts.push(record);
                            return Ok(Solution { parameters, trace });
                        }
                        Err(violation) => {
                            record.outcome = AttemptOutcome::PhysicallyInvalidRoot(violation);
                            DriverState::Retry(record)
                        }
                    }
                }
                DriverState::Retry(record) => {
                    debug!(
                        relation = %record.relation,
                        candidate = record.candidate,
                        iterations = record.iterations,
                        outcome = %record.outcome,
                        "attempt failed"
                    );
                    trace.attempts.push(record);
                    DriverState::Seeded(record.candidate + 1)
                }
                DriverState::Failed => return Err(trace),
            }
        }
    }

    fn seed(system: &ResidualSystem, seed: &ParameterVector) -> Result<SolveState, AttemptOutcome> {
        let x = seed.to_internal();
        if !ParameterVector::is_admissible_internal(&x)
            || !ParameterVector::is_within_ceilings_internal(&x, system.cell())
        {
            return Err(AttemptOutcome::Diverged(DivergenceReason::InadmissibleSeed));
        }
        let evaluation = system
            .evaluate(&x)
            .map_err(|error| AttemptOutcome::Diverged(DivergenceReason::ResidualOverflow(error)))?;
        Ok(SolveState {
            x,
            evaluation,
            iteration: 0,
            last_step_norm: f64::NAN,
            growth_steps: 0,
        })
    }

    fn step(&self, system: &ResidualSystem, state: &mut SolveState) -> Step {
        let norm = state.evaluation.norm;
        if norm < self.options.tolerance {
            return Step::Done(AttemptOutcome::Converged);
        }
        if state.iteration >= self.options.max_iterations {
            return Step::Done(AttemptOutcome::MaxIterationsExceeded);
        }

        let direction = match LuFactorization::new(
            state.evaluation.jacobian.view(),
            self.options.pivot_tolerance,
        )
        .and_then(|lu| lu.solve(aview1(&state.evaluation.residuals.map(|f| -f))))
        {
            Ok(direction) => direction,
            Err(error) => return Step::Done(AttemptOutcome::SingularJacobian(error)),
        };

        // The first admissible trial keeping the residual growth acceptable wins, otherwise the
        // shortest admissible one is taken
        let mut lambda = 1.0;
        let mut accepted = None;
        let mut fallback = None;
        for _ in 0..=self.options.max_step_halvings {
            let mut trial = state.x;
            for (value, delta) in trial.iter_mut().zip(direction.iter()) {
                *value += lambda * delta;
            }
            if ParameterVector::is_admissible_internal(&trial) {
                if let Ok(evaluation) = system.evaluate(&trial) {
                    if evaluation.norm <= self.options.max_residual_growth * norm {
                        accepted = Some((trial, evaluation, lambda));
                        break;
                    }
                    fallback = Some((trial, evaluation, lambda));
                }
            }
            lambda *= 0.5;
        }
        let Some((x, evaluation, lambda)) = accepted.or(fallback) else {
            return Step::Done(AttemptOutcome::Diverged(
                DivergenceReason::LeftAdmissibleRegion,
            ));
        };
        if !ParameterVector::is_within_ceilings_internal(&x, system.cell()) {
            trace!(rs = x[3], rsh = x[4], "resistance ceiling crossed");
            return Step::Done(AttemptOutcome::Diverged(
                DivergenceReason::LeftAdmissibleRegion,
            ));
        }

        if evaluation.norm > norm {
            state.growth_steps += 1;
        } else {
            state.growth_steps = 0;
        }
        state.last_step_norm = lambda * direction.dot(&direction).sqrt();
        state.x = x;
        state.evaluation = evaluation;
        state.iteration += 1;
        trace!(
            iteration = state.iteration,
            residual_norm = state.evaluation.norm,
            step_norm = state.last_step_norm,
            lambda,
            "newton step"
        );
        if state.growth_steps >= self.options.max_growth_steps {
            return Step::Done(AttemptOutcome::Diverged(DivergenceReason::ResidualGrowth));
        }
        Step::Continue
    }
}
