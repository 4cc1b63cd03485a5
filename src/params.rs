use crate::datasheet::MeasuredCell;
use crate::technology::Technology;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Number of unknowns of the single-diode model
pub const NPARAMS: usize = 5;

/// Largest shunt resistance in units of `Voc / Isc`
pub const MAX_SHUNT_RESISTANCE_SCALE: f64 = 1e6;

/// Single-diode equivalent-circuit parameters of a module
///
/// - `a`: modified diode factor `n Nser kT/q`, V
/// - `il`: light-generated current, A
/// - `io`: diode saturation current, A
/// - `rs`: series resistance, Ohm
/// - `rsh`: shunt resistance, Ohm
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParameterVector {
    pub a: f64,
    pub il: f64,
    pub io: f64,
    pub rs: f64,
    pub rsh: f64,
}

impl ParameterVector {
    pub fn new(a: f64, il: f64, io: f64, rs: f64, rsh: f64) -> Self {
        Self { a, il, io, rs, rsh }
    }

    pub fn from_array([a, il, io, rs, rsh]: [f64; NPARAMS]) -> Self {
        Self::new(a, il, io, rs, rsh)
    }

    pub fn to_array(&self) -> [f64; NPARAMS] {
        [self.a, self.il, self.io, self.rs, self.rsh]
    }

    /// Solver coordinates `[a, Il, ln Io, Rs, Rsh]`
    pub fn to_internal(&self) -> [f64; NPARAMS] {
        [self.a, self.il, self.io.ln(), self.rs, self.rsh]
    }

    pub fn from_internal(x: &[f64; NPARAMS]) -> Self {
        Self::new(x[0], x[1], x[2].exp(), x[3], x[4])
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Whether the Newton iteration may step to internal coordinates `x`
    ///
    /// Saturation current is positive by construction, so it is not checked beyond finiteness.
    pub fn is_admissible_internal(x: &[f64; NPARAMS]) -> bool {
        x.iter().all(|v| v.is_finite()) && x[0] > 0.0 && x[1] > 0.0 && x[3] >= 0.0 && x[4] > 0.0
    }

    /// Whether resistances of internal coordinates `x` stay below the physical ceilings of `cell`
    ///
    /// Series resistance may not exceed `Voc / Isc`, the module would not deliver any power, and
    /// shunt resistance may not exceed [MAX_SHUNT_RESISTANCE_SCALE] times that.
    pub fn is_within_ceilings_internal(x: &[f64; NPARAMS], cell: &MeasuredCell) -> bool {
        let scale = cell.voc / cell.isc;
        x[3] <= scale && x[4] <= MAX_SHUNT_RESISTANCE_SCALE * scale
    }

    /// Post-convergence physical plausibility of a root
    pub fn check_sanity(
        &self,
        cell: &MeasuredCell,
        technology: Technology,
    ) -> Result<(), SanityViolation> {
        if !self.is_finite() {
            return Err(SanityViolation::NonFinite);
        }
        let positive = [
            ("a", self.a),
            ("Il", self.il),
            ("Io", self.io),
            ("Rsh", self.rsh),
        ];
        if let Some(&(name, value)) = positive.iter().find(|(_, value)| *value <= 0.0) {
            return Err(SanityViolation::NonPositive { name, value });
        }
        if self.rs < 0.0 {
            return Err(SanityViolation::NonPositive {
                name: "Rs",
                value: self.rs,
            });
        }
        if !(0.9 * cell.isc..=2.0 * cell.isc).contains(&self.il) {
            return Err(SanityViolation::LightCurrent {
                il: self.il,
                isc: cell.isc,
            });
        }
        if self.io >= 0.1 * cell.isc {
            return Err(SanityViolation::SaturationCurrent {
                io: self.io,
                isc: cell.isc,
            });
        }
        let ideality = cell.ideality(self.a);
        let (min, max) = technology.ideality_range();
        if !(min..=max).contains(&ideality) {
            return Err(SanityViolation::Ideality { ideality, min, max });
        }
        Ok(())
    }
}

/// Reason to reject a numerically converged root
#[derive(Debug, thiserror::Error, PartialEq, Clone, Copy, Serialize)]
pub enum SanityViolation {
    #[error("parameters are not finite")]
    NonFinite,

    #[error("{name} = {value} must be positive")]
    NonPositive { name: &'static str, value: f64 },

    #[error("light current {il} is out of range for short-circuit current {isc}")]
    LightCurrent { il: f64, isc: f64 },

    #[error("saturation current {io} is too large for short-circuit current {isc}")]
    SaturationCurrent { io: f64, isc: f64 },

    #[error("per-cell ideality factor {ideality} is outside [{min}, {max}]")]
    Ideality { ideality: f64, min: f64, max: f64 },
}
