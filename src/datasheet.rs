use crate::error::DatasheetError;
use crate::technology::BOLTZMANN_EV;

use conv::ConvUtil;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const CELSIUS_TO_KELVIN: f64 = 273.15;

/// Temperature step between the reference and the elevated operating point, K
pub const ELEVATED_TEMPERATURE_STEP: f64 = 10.0;

/// Module data sheet as supplied by a host
///
/// Voltages are in volts, currents in amperes, `beta_voc` in V/K, `alpha_isc` in A/K, `gamma_pmp`
/// in %/K and `tref_degc` in degrees Celsius.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Datasheet {
    pub vmp: f64,
    pub imp: f64,
    pub voc: f64,
    pub isc: f64,
    pub beta_voc: f64,
    pub alpha_isc: f64,
    pub gamma_pmp: f64,
    pub nser: i32,
    pub tref_degc: f64,
}

impl Datasheet {
    /// Check the data sheet and convert it to the solver's [MeasuredCell]
    pub fn validate(&self) -> Result<MeasuredCell, DatasheetError> {
        let fields = [
            ("Vmp", self.vmp),
            ("Imp", self.imp),
            ("Voc", self.voc),
            ("Isc", self.isc),
            ("beta_Voc", self.beta_voc),
            ("alpha_Isc", self.alpha_isc),
            ("gamma_Pmp", self.gamma_pmp),
            ("Tref", self.tref_degc),
        ];
        if let Some(&(name, value)) = fields.iter().find(|(_, value)| !value.is_finite()) {
            return Err(DatasheetError::NonFinite { name, value });
        }

        let tref = self.tref_degc + CELSIUS_TO_KELVIN;
        let positive = [
            ("Vmp", self.vmp),
            ("Imp", self.imp),
            ("Voc", self.voc),
            ("Isc", self.isc),
            ("Tref", tref),
        ];
        if let Some(&(name, value)) = positive.iter().find(|(_, value)| *value <= 0.0) {
            return Err(DatasheetError::NonPositive { name, value });
        }

        if self.imp >= self.isc {
            return Err(DatasheetError::CurrentOrder {
                imp: self.imp,
                isc: self.isc,
            });
        }
        if self.vmp >= self.voc {
            return Err(DatasheetError::VoltageOrder {
                vmp: self.vmp,
                voc: self.voc,
            });
        }

        let nser = self
            .nser
            .value_as::<u32>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or(DatasheetError::SeriesCells(self.nser))?;

        let cell = MeasuredCell {
            vmp: self.vmp,
            imp: self.imp,
            voc: self.voc,
            isc: self.isc,
            beta_voc: self.beta_voc,
            alpha_isc: self.alpha_isc,
            gamma_pmp: self.gamma_pmp,
            nser,
            tref,
        };
        let elevated_voc = cell.elevated_voc();
        if elevated_voc <= 0.0 {
            return Err(DatasheetError::ElevatedVoc {
                temperature: cell.elevated_temperature(),
                voc: elevated_voc,
            });
        }
        Ok(cell)
    }
}

/// Validated data sheet of one fit, the reference temperature is in Kelvin
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasuredCell {
    pub vmp: f64,
    pub imp: f64,
    pub voc: f64,
    pub isc: f64,
    pub beta_voc: f64,
    pub alpha_isc: f64,
    pub gamma_pmp: f64,
    pub nser: u32,
    pub tref: f64,
}

impl MeasuredCell {
    /// Thermal voltage `kT/q` of a single cell at the reference temperature
    pub fn thermal_voltage(&self) -> f64 {
        BOLTZMANN_EV * self.tref
    }

    /// Module diode factor `a` corresponding to a per-cell ideality factor
    pub fn diode_factor(&self, ideality: f64) -> f64 {
        ideality * f64::from(self.nser) * self.thermal_voltage()
    }

    /// Per-cell ideality factor corresponding to a module diode factor `a`
    pub fn ideality(&self, diode_factor: f64) -> f64 {
        diode_factor / (f64::from(self.nser) * self.thermal_voltage())
    }

    pub fn elevated_temperature(&self) -> f64 {
        self.tref + ELEVATED_TEMPERATURE_STEP
    }

    /// Open-circuit voltage at [Self::elevated_temperature] by the linear coefficient
    pub fn elevated_voc(&self) -> f64 {
        self.voc + self.beta_voc * ELEVATED_TEMPERATURE_STEP
    }

    /// Light current shift at [Self::elevated_temperature] by the linear coefficient
    pub fn elevated_light_current_shift(&self) -> f64 {
        self.alpha_isc * ELEVATED_TEMPERATURE_STEP
    }
}
