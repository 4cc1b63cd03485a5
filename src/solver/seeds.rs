use crate::datasheet::MeasuredCell;
use crate::params::ParameterVector;
use crate::technology::Technology;

use enum_dispatch::enum_dispatch;
use itertools::iproduct;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Source of initial guesses for the Newton iteration
///
/// Candidates are deterministic and are tried in the returned order. A candidate may be
/// non-finite or inadmissible, the driver counts it as a failed attempt.
#[enum_dispatch]
pub trait InitialGuessTrait {
    fn candidates(&self, cell: &MeasuredCell, technology: Technology) -> Vec<ParameterVector>;
}

/// Initial guesses to use for a fit
#[enum_dispatch(InitialGuessTrait)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[non_exhaustive]
pub enum InitialGuess {
    Technology(TechnologySearch),
    Fixed(FixedCandidates),
}

impl InitialGuess {
    pub fn technology() -> Self {
        TechnologySearch::default().into()
    }

    pub fn fixed(candidates: Vec<ParameterVector>) -> Self {
        FixedCandidates::new(candidates).into()
    }
}

impl Default for InitialGuess {
    fn default() -> Self {
        Self::technology()
    }
}

/// Closed-form guesses for every ideality candidate of the technology and every shunt scale
///
/// For a per-cell ideality factor `n` and shunt scale `s`:
///
/// ```text
/// a   = n Nser k Tref / q
/// Rsh = s 20 Voc / Isc
/// Rs  = (Voc - Vmp + a ln(1 - Imp / Isc)) / Imp, at most (Voc - Vmp) / (2 Imp),
///       or 0.01 Voc / Isc if the estimate is not positive
/// Il  = Isc (1 + Rs / Rsh)
/// Io  = (Il - Voc / Rsh) / (exp(Voc / a) - 1), or Isc exp(-Voc / a) if not positive
/// ```
///
/// Shunt scales form the outer loop, ideality candidates the inner one.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename = "TechnologySearch")]
pub struct TechnologySearch {
    shunt_scales: Vec<f64>,
}

impl TechnologySearch {
    pub fn new(shunt_scales: Vec<f64>) -> Self {
        assert!(!shunt_scales.is_empty(), "shunt_scales must not be empty");
        assert!(
            shunt_scales.iter().all(|s| s.is_finite() && *s > 0.0),
            "shunt_scales must be positive and finite"
        );
        Self { shunt_scales }
    }

    #[inline]
    pub fn default_shunt_scales() -> Vec<f64> {
        vec![1.0, 10.0, 0.1]
    }

    fn guess(cell: &MeasuredCell, ideality: f64, shunt_scale: f64) -> ParameterVector {
        let MeasuredCell {
            vmp, imp, voc, isc, ..
        } = *cell;
        let a = cell.diode_factor(ideality);
        let rsh = shunt_scale * 20.0 * voc / isc;
        let rs = match (voc - vmp + a * (-imp / isc).ln_1p()) / imp {
            rs if rs > 0.0 => rs.min(0.5 * (voc - vmp) / imp),
            _ => 0.01 * voc / isc,
        };
        let il = isc * (1.0 + rs / rsh);
        let io = match (il - voc / rsh) / (voc / a).exp_m1() {
            io if io > 0.0 && io.is_finite() => io,
            _ => isc * (-voc / a).exp(),
        };
        ParameterVector::new(a, il, io, rs, rsh)
    }
}

impl Default for TechnologySearch {
    fn default() -> Self {
        Self::new(Self::default_shunt_scales())
    }
}

impl InitialGuessTrait for TechnologySearch {
    fn candidates(&self, cell: &MeasuredCell, technology: Technology) -> Vec<ParameterVector> {
        iproduct!(
            self.shunt_scales.iter(),
            technology.ideality_candidates().iter()
        )
        .map(|(&shunt_scale, &ideality)| Self::guess(cell, ideality, shunt_scale))
        .collect()
    }
}

/// User-supplied guesses, the same for every data sheet
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename = "FixedCandidates")]
pub struct FixedCandidates {
    candidates: Vec<ParameterVector>,
}

impl FixedCandidates {
    pub fn new(candidates: Vec<ParameterVector>) -> Self {
        assert!(!candidates.is_empty(), "candidates must not be empty");
        Self { candidates }
    }
}

impl InitialGuessTrait for FixedCandidates {
    fn candidates(&self, _cell: &MeasuredCell, _technology: Technology) -> Vec<ParameterVector> {
        self.candidates.clone()
    }
}
