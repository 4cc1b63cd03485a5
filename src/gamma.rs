use crate::datasheet::MeasuredCell;
use crate::params::ParameterVector;
use crate::technology::Technology;

use tracing::warn;

/// Short-circuit current temperature coefficients below this value, A/K, are treated as zero
const ALPHA_ISC_EPS: f64 = 1e-12;

/// Temperature adjustment of the fitted single-diode model
///
/// Away from the reference temperature the model scales `a` linearly with temperature, `Io`
/// follows the band-gap law of the cell technology and `Il` changes with the corrected
/// coefficient `alpha_isc * (1 - Adj / 100)`. `Adj` is chosen so that the maximum power of the
/// model changes with temperature by the data sheet `gamma_pmp`.
///
/// The derivative of the maximum power over temperature is taken at fixed voltage (the maximum
/// is stationary in voltage), which gives `Adj` in a closed form:
///
/// ```text
/// dPmp/dT = Vmp (alpha' - D) / (1 + Rs G)
/// D = Io (exp(u) - 1) d(ln Io)/dT - Io exp(u) u / Tref,  u = (Vmp + Imp Rs) / a
/// G = Io exp(u) / a + 1 / Rsh
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GammaModel {
    technology: Technology,
}

struct MppSensitivity {
    /// Current loss per Kelvin due to the diode, A/K
    diode_drift: f64,
    /// `1 + Rs G`
    series_factor: f64,
}

impl GammaModel {
    pub fn new(technology: Technology) -> Self {
        Self { technology }
    }

    fn sensitivity(&self, cell: &MeasuredCell, params: &ParameterVector) -> MppSensitivity {
        let u = (cell.vmp + cell.imp * params.rs) / params.a;
        let exp_u = u.exp();
        let log_slope = self.technology.saturation_current_log_slope(cell.tref);
        let diode_drift =
            params.io * u.exp_m1() * log_slope - params.io * exp_u * u / cell.tref;
        let conductance = params.io * exp_u / params.a + params.rsh.recip();
        MppSensitivity {
            diode_drift,
            series_factor: 1.0 + params.rs * conductance,
        }
    }

    /// `Adj` in percent
    pub fn adjustment(&self, cell: &MeasuredCell, params: &ParameterVector) -> f64 {
        if cell.alpha_isc.abs() < ALPHA_ISC_EPS {
            return 0.0;
        }
        let s = self.sensitivity(cell, params);
        let required_alpha =
            s.diode_drift + 0.01 * cell.gamma_pmp * cell.imp * s.series_factor;
        let adj = 100.0 * (1.0 - required_alpha / cell.alpha_isc);
        if adj.abs() > 100.0 {
            warn!(
                adj,
                technology = %self.technology,
                "temperature adjustment is larger than the short-circuit current coefficient"
            );
        }
        adj
    }

    /// Maximum power temperature coefficient, %/K, of the model adjusted by `adj`
    ///
    /// This is the inverse of [Self::adjustment]: `cell.gamma_pmp` is ignored.
    pub fn pmp_temperature_coefficient(
        &self,
        cell: &MeasuredCell,
        params: &ParameterVector,
        adj: f64,
    ) -> f64 {
        let s = self.sensitivity(cell, params);
        let alpha = cell.alpha_isc * (1.0 - 0.01 * adj);
        100.0 * (alpha - s.diode_drift) / (cell.imp * s.series_factor)
    }
}
