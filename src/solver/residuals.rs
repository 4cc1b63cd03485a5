use crate::datasheet::MeasuredCell;
use crate::error::ResidualError;
use crate::params::NPARAMS;
use crate::solver::LikeFloat;
use crate::technology::Technology;

use ndarray::{Array2, array};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest accepted argument of `exp`
pub const EXP_ARGUMENT_LIMIT: f64 = 700.0;

/// Fifth equation closing the system of the four data-sheet operating points
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum AuxiliaryRelation {
    /// The open-circuit point extrapolated to `Tref + 10 K` by `beta_voc` lies on the model
    /// translated to that temperature
    ElevatedOpenCircuit,
    /// Shunt resistance is [Technology::shunt_series_ratio] times series resistance
    ShuntSeriesRatio,
}

impl fmt::Display for AuxiliaryRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElevatedOpenCircuit => f.write_str("elevated-temperature open circuit"),
            Self::ShuntSeriesRatio => f.write_str("shunt to series resistance ratio"),
        }
    }
}

/// Governing equations of the single-diode model for one data sheet
///
/// Residuals are currents, amperes. Coordinates are internal: `[a, Il, ln Io, Rs, Rsh]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResidualSystem {
    cell: MeasuredCell,
    relation: AuxiliaryRelation,
    /// `T2 / Tref`, the diode factor scales linearly with temperature
    temperature_ratio: f64,
    /// `Io(T2) / Io(Tref)`
    saturation_ratio: f64,
    elevated_voc: f64,
    elevated_il_shift: f64,
    shunt_series_ratio: f64,
}

/// Residuals, Jacobian and the residual norm at a single point
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub residuals: [f64; NPARAMS],
    pub jacobian: Array2<f64>,
    pub norm: f64,
}

fn checked_exponent<T: LikeFloat>(argument: T) -> Result<T, ResidualError> {
    let value = argument.real_part();
    if value <= EXP_ARGUMENT_LIMIT {
        Ok(argument)
    } else {
        Err(ResidualError::ExponentOverflow(value))
    }
}

impl ResidualSystem {
    pub fn new(cell: &MeasuredCell, technology: Technology, relation: AuxiliaryRelation) -> Self {
        let elevated_temperature = cell.elevated_temperature();
        Self {
            cell: *cell,
            relation,
            temperature_ratio: elevated_temperature / cell.tref,
            saturation_ratio: technology.saturation_current_ratio(cell.tref, elevated_temperature),
            elevated_voc: cell.elevated_voc(),
            elevated_il_shift: cell.elevated_light_current_shift(),
            shunt_series_ratio: technology.shunt_series_ratio(),
        }
    }

    pub fn cell(&self) -> &MeasuredCell {
        &self.cell
    }

    pub fn relation(&self) -> AuxiliaryRelation {
        self.relation
    }

    /// Residual vector `F(x)`
    pub fn residuals<T: LikeFloat>(&self, x: &[T; NPARAMS]) -> Result<[T; NPARAMS], ResidualError> {
        let c = T::constant;
        let [a, il, ln_io, rs, rsh] = *x;
        let (vmp, imp, voc, isc) = (
            c(self.cell.vmp),
            c(self.cell.imp),
            c(self.cell.voc),
            c(self.cell.isc),
        );

        let io = checked_exponent(ln_io)?.exp();
        let u_sc = checked_exponent(isc * rs / a)?;
        let u_oc = checked_exponent(voc / a)?;
        let v_mp = vmp + imp * rs;
        let u_mp = checked_exponent(v_mp / a)?;
        let conductance = io / a * u_mp.exp() + rsh.recip();

        let auxiliary = match self.relation {
            AuxiliaryRelation::ElevatedOpenCircuit => {
                let elevated_voc = c(self.elevated_voc);
                let u_el = checked_exponent(elevated_voc / (a * c(self.temperature_ratio)))?;
                il + c(self.elevated_il_shift)
                    - io * c(self.saturation_ratio) * u_el.exp_m1()
                    - elevated_voc / rsh
            }
            // Linear in resistances, scaled to amperes
            AuxiliaryRelation::ShuntSeriesRatio => {
                (c(self.shunt_series_ratio) * rs - rsh) * isc / voc
            }
        };
        let f = [
            il - io * u_sc.exp_m1() - isc * rs / rsh - isc,
            il - io * u_oc.exp_m1() - voc / rsh,
            il - io * u_mp.exp_m1() - v_mp / rsh - imp,
            conductance * (vmp - imp * rs) - imp,
            auxiliary,
        ];
        match f.iter().position(|value| !value.is_finite()) {
            Some(equation) => Err(ResidualError::NonFiniteResidual(equation)),
            None => Ok(f),
        }
    }

    /// Analytic Jacobian `∂F/∂x`, rows are equations
    pub fn jacobian(&self, x: &[f64; NPARAMS]) -> Result<Array2<f64>, ResidualError> {
        let [a, _, ln_io, rs, rsh] = *x;
        let MeasuredCell {
            vmp, imp, voc, isc, ..
        } = self.cell;

        let io = checked_exponent(ln_io)?.exp();
        let u_sc = checked_exponent(isc * rs / a)?;
        let e_sc = u_sc.exp();
        let u_oc = checked_exponent(voc / a)?;
        let e_oc = u_oc.exp();
        let v_mp = vmp + imp * rs;
        let w_mp = vmp - imp * rs;
        let u_mp = checked_exponent(v_mp / a)?;
        let e_mp = u_mp.exp();
        let conductance = io / a * e_mp + rsh.recip();
        let rsh2 = rsh.powi(2);
        let a2 = a.powi(2);
        let auxiliary = match self.relation {
            AuxiliaryRelation::ElevatedOpenCircuit => {
                let io_el = io * self.saturation_ratio;
                let u_el = checked_exponent(self.elevated_voc / (a * self.temperature_ratio))?;
                let e_el = u_el.exp();
                [io_el * e_el * u_el / a, 1.0, -io_el * u_el.exp_m1(), 0.0, self.elevated_voc / rsh2]
            }
            AuxiliaryRelation::ShuntSeriesRatio => {
                let scale = isc / voc;
                [0.0, 0.0, 0.0, self.shunt_series_ratio * scale, -scale]
            }
        };

        #[rustfmt::skip]
        let jacobian: Array2<f64> = array![
            [io * e_sc * u_sc / a, 1.0, -io * u_sc.exp_m1(), -io * e_sc * isc / a - isc / rsh, isc * rs / rsh2],
            [io * e_oc * u_oc / a, 1.0, -io * u_oc.exp_m1(), 0.0, voc / rsh2],
            [io * e_mp * u_mp / a, 1.0, -io * u_mp.exp_m1(), -io * e_mp * imp / a - imp / rsh, v_mp / rsh2],
            [
                -w_mp * io * e_mp * (1.0 + u_mp) / a2,
                0.0,
                w_mp * io * e_mp / a,
                w_mp * io * e_mp * imp / a2 - conductance * imp,
                -w_mp / rsh2,
            ],
            auxiliary,
        ];
        match jacobian.indexed_iter().find(|(_, value)| !value.is_finite()) {
            Some(((row, column), _)) => Err(ResidualError::NonFiniteJacobian { row, column }),
            None => Ok(jacobian),
        }
    }

    pub fn evaluate(&self, x: &[f64; NPARAMS]) -> Result<Evaluation, ResidualError> {
        let residuals = self.residuals(x)?;
        let jacobian = self.jacobian(x)?;
        let norm = residuals.iter().map(|f| f.powi(2)).sum::<f64>().sqrt();
        Ok(Evaluation {
            residuals,
            jacobian,
            norm,
        })
    }
}
