use crate::datasheet::{Datasheet, ELEVATED_TEMPERATURE_STEP};
use crate::gamma::GammaModel;
use crate::params::ParameterVector;
use crate::technology::Technology;

const MAX_ITERATIONS: usize = 200;
const REL_TOLERANCE: f64 = 1e-15;

/// Forward evaluation of the single-diode model
///
/// `I = Il - Io (exp((V + I Rs) / a) - 1) - (V + I Rs) / Rsh`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SingleDiode {
    params: ParameterVector,
}

impl SingleDiode {
    pub fn new(params: ParameterVector) -> Self {
        Self { params }
    }

    pub fn parameters(&self) -> &ParameterVector {
        &self.params
    }

    /// Residual of the implicit diode equation and its derivative over current
    fn current_residual(&self, voltage: f64, current: f64) -> (f64, f64) {
        let ParameterVector { a, il, io, rs, rsh } = self.params;
        let vd = voltage + current * rs;
        let exp = (vd / a).exp();
        let f = il - current - io * (exp - 1.0) - vd / rsh;
        let df = -1.0 - io * rs / a * exp - rs / rsh;
        (f, df)
    }

    /// Terminal current at `voltage`
    ///
    /// Newton iterations safeguarded by bisection, the residual is monotonically decreasing in
    /// current.
    pub fn current(&self, voltage: f64) -> f64 {
        let il = self.params.il;
        let mut lo = -il - 1.0;
        let mut hi = il + 1.0;
        for _ in 0..MAX_ITERATIONS {
            if self.current_residual(voltage, lo).0 >= 0.0 {
                break;
            }
            lo = 2.0 * lo - 1.0;
        }
        for _ in 0..MAX_ITERATIONS {
            if self.current_residual(voltage, hi).0 <= 0.0 {
                break;
            }
            hi = 2.0 * hi + 1.0;
        }

        let mut current = il.clamp(lo, hi);
        for _ in 0..MAX_ITERATIONS {
            let (f, df) = self.current_residual(voltage, current);
            if f == 0.0 {
                break;
            }
            if f > 0.0 {
                lo = current;
            } else {
                hi = current;
            }
            let mut next = current - f / df;
            if !(lo < next && next < hi) {
                next = 0.5 * (lo + hi);
            }
            let converged = (next - current).abs() <= REL_TOLERANCE * current.abs().max(1.0);
            current = next;
            if converged || hi - lo <= REL_TOLERANCE * hi.abs().max(1.0) {
                break;
            }
        }
        current
    }

    pub fn short_circuit_current(&self) -> f64 {
        self.current(0.0)
    }

    /// Open-circuit voltage
    ///
    /// Newton iterations start from the infinite-shunt solution, which bounds the root from
    /// above, and decrease monotonically.
    pub fn open_circuit_voltage(&self) -> f64 {
        let ParameterVector { a, il, io, rsh, .. } = self.params;
        let mut voltage = a * (il / io).ln_1p();
        for _ in 0..MAX_ITERATIONS {
            let exp = (voltage / a).exp();
            let g = il - io * (exp - 1.0) - voltage / rsh;
            let dg = -io / a * exp - rsh.recip();
            let next = voltage - g / dg;
            let converged = (next - voltage).abs() <= 10.0 * REL_TOLERANCE * voltage.abs();
            voltage = next;
            if converged {
                break;
            }
        }
        voltage
    }

    /// Maximum power point `(Vmp, Imp)`
    ///
    /// Bisection over `[0, Voc]` on `dP/dV`, which is proportional to `I - V G / (1 + Rs G)`
    /// with the differential conductance `G = Io / a exp((V + I Rs) / a) + 1 / Rsh`.
    pub fn max_power_point(&self) -> (f64, f64) {
        let ParameterVector { a, io, rs, rsh, .. } = self.params;
        let slope = |voltage: f64| {
            let current = self.current(voltage);
            let g = io / a * ((voltage + current * rs) / a).exp() + rsh.recip();
            current - voltage * g / (1.0 + rs * g)
        };
        let mut lo = 0.0;
        let mut hi = self.open_circuit_voltage();
        for _ in 0..MAX_ITERATIONS {
            let mid = 0.5 * (lo + hi);
            if slope(mid) > 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo <= REL_TOLERANCE * hi {
                break;
            }
        }
        let voltage = 0.5 * (lo + hi);
        (voltage, self.current(voltage))
    }

    /// Model translated from `t_ref` to `temperature`, Kelvin
    ///
    /// `alpha_isc` is the light current temperature coefficient, A/K, already corrected by the
    /// temperature adjustment if any.
    pub fn at_temperature(
        &self,
        technology: Technology,
        t_ref: f64,
        temperature: f64,
        alpha_isc: f64,
    ) -> Self {
        let p = self.params;
        Self::new(ParameterVector {
            a: p.a * temperature / t_ref,
            il: p.il + alpha_isc * (temperature - t_ref),
            io: p.io * technology.saturation_current_ratio(t_ref, temperature),
            rs: p.rs,
            rsh: p.rsh,
        })
    }

    /// Data sheet the model produces
    ///
    /// `beta_voc` is the secant slope of the open-circuit voltage over the elevated temperature
    /// step with the unadjusted `alpha_isc`, `gamma_pmp` reproduces the adjustment `adj`.
    pub fn datasheet(
        &self,
        technology: Technology,
        nser: i32,
        tref_degc: f64,
        alpha_isc: f64,
        adj: f64,
    ) -> Datasheet {
        let (vmp, imp) = self.max_power_point();
        let voc = self.open_circuit_voltage();
        let mut datasheet = Datasheet {
            vmp,
            imp,
            voc,
            isc: self.short_circuit_current(),
            beta_voc: 0.0,
            alpha_isc,
            gamma_pmp: 0.0,
            nser,
            tref_degc,
        };
        let Ok(cell) = datasheet.validate() else {
            return datasheet;
        };
        let elevated = self.at_temperature(
            technology,
            cell.tref,
            cell.elevated_temperature(),
            alpha_isc,
        );
        datasheet.beta_voc = (elevated.open_circuit_voltage() - voc) / ELEVATED_TEMPERATURE_STEP;
        datasheet.gamma_pmp =
            GammaModel::new(technology).pmp_temperature_coefficient(&cell, &self.params, adj);
        datasheet
    }
}
