use crate::error::FitError;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Boltzmann constant, eV/K
pub const BOLTZMANN_EV: f64 = 8.617333262e-5;

/// Photovoltaic cell technology
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Technology {
    MonoSi,
    MultiSi,
    Cis,
    Cigs,
    CdTe,
    Amorphous,
}

/// Label patterns, the first pattern contained in a label wins
///
/// "cigs" does not contain "cis", so the two never compete, but the order is still significant
/// for labels naming several technologies.
const LABEL_PATTERNS: &[(&str, Technology)] = &[
    ("mono", Technology::MonoSi),
    ("multi", Technology::MultiSi),
    ("poly", Technology::MultiSi),
    ("cis", Technology::Cis),
    ("cigs", Technology::Cigs),
    ("cdte", Technology::CdTe),
    ("amor", Technology::Amorphous),
];

const SILICON_IDEALITY: [f64; 5] = [1.0, 1.2, 0.85, 1.5, 2.0];
const THIN_FILM_IDEALITY: [f64; 5] = [1.5, 1.2, 1.8, 2.2, 1.0];
const AMORPHOUS_IDEALITY: [f64; 5] = [1.8, 1.5, 2.2, 2.6, 1.2];

impl Technology {
    pub const ALL: [Self; 6] = [
        Self::MonoSi,
        Self::MultiSi,
        Self::Cis,
        Self::Cigs,
        Self::CdTe,
        Self::Amorphous,
    ];

    /// Classify a free-text technology label
    ///
    /// Patterns are matched as case-sensitive substrings in a fixed order. A label that matches
    /// nothing is matched once more in ASCII lower case, so "CdTe-thinfilm" is recognized.
    pub fn classify(label: &str) -> Result<Self, FitError> {
        Self::match_label(label)
            .or_else(|| Self::match_label(&label.to_ascii_lowercase()))
            .ok_or_else(|| FitError::UnknownTechnology(label.to_owned()))
    }

    fn match_label(label: &str) -> Option<Self> {
        LABEL_PATTERNS
            .iter()
            .find(|(pattern, _)| label.contains(pattern))
            .map(|&(_, technology)| technology)
    }

    /// Band gap at the reference temperature, eV
    pub fn band_gap(self) -> f64 {
        match self {
            Self::MonoSi | Self::MultiSi => 1.121,
            Self::Cis => 1.010,
            Self::Cigs => 1.15,
            Self::CdTe => 1.475,
            Self::Amorphous => 1.7,
        }
    }

    /// Relative band gap temperature slope, 1/K
    pub fn band_gap_slope(self) -> f64 {
        match self {
            Self::MonoSi | Self::MultiSi => -0.0002677,
            Self::Cis | Self::Cigs => -0.00011,
            Self::CdTe => -0.0003,
            Self::Amorphous => -0.0002,
        }
    }

    /// Per-cell diode ideality factors used as initial guesses, most likely first
    pub fn ideality_candidates(self) -> &'static [f64] {
        match self {
            Self::MonoSi | Self::MultiSi => &SILICON_IDEALITY,
            Self::Cis | Self::Cigs | Self::CdTe => &THIN_FILM_IDEALITY,
            Self::Amorphous => &AMORPHOUS_IDEALITY,
        }
    }

    /// Plausible per-cell ideality factor of a fitted module, inclusive
    pub fn ideality_range(self) -> (f64, f64) {
        match self {
            Self::MonoSi | Self::MultiSi => (0.5, 2.5),
            Self::Cis | Self::Cigs | Self::CdTe => (0.5, 3.5),
            Self::Amorphous => (0.5, 5.0),
        }
    }

    /// Typical ratio of shunt to series resistance of a module, `Rsh / Rs`
    pub fn shunt_series_ratio(self) -> f64 {
        match self {
            Self::MonoSi | Self::MultiSi => 2000.0,
            Self::Cis | Self::Cigs | Self::CdTe => 500.0,
            Self::Amorphous => 100.0,
        }
    }

    /// Band gap at `temperature`, both temperatures are in Kelvin
    pub fn band_gap_at(self, t_ref: f64, temperature: f64) -> f64 {
        self.band_gap() * (1.0 + self.band_gap_slope() * (temperature - t_ref))
    }

    /// Ratio of diode saturation currents `Io(temperature) / Io(t_ref)`
    pub fn saturation_current_ratio(self, t_ref: f64, temperature: f64) -> f64 {
        let eg_ref = self.band_gap();
        let eg = self.band_gap_at(t_ref, temperature);
        (temperature / t_ref).powi(3)
            * f64::exp(eg_ref / (BOLTZMANN_EV * t_ref) - eg / (BOLTZMANN_EV * temperature))
    }

    /// `d ln Io / dT` at the reference temperature, 1/K
    pub fn saturation_current_log_slope(self, t_ref: f64) -> f64 {
        3.0 / t_ref
            + self.band_gap() * (1.0 - self.band_gap_slope() * t_ref)
                / (BOLTZMANN_EV * t_ref.powi(2))
    }
}

impl FromStr for Technology {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::classify(s)
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MonoSi => "monocrystalline silicon",
            Self::MultiSi => "multicrystalline silicon",
            Self::Cis => "CIS",
            Self::Cigs => "CIGS",
            Self::CdTe => "CdTe",
            Self::Amorphous => "amorphous silicon",
        };
        f.write_str(name)
    }
}
