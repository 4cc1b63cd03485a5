#![doc = include_str!("../README.md")]


mod clock;
pub use clock::{Clock, FixedClock, MonotonicClock};

mod datasheet;
pub use datasheet::{CELSIUS_TO_KELVIN, Datasheet, ELEVATED_TEMPERATURE_STEP, MeasuredCell};

mod error;
pub use error::{DatasheetError, FitError, LinearSolveError, ResidualError};

mod fitter;
pub use fitter::{FitOutput, FitResult, ParameterFitter, fit};

mod gamma;
pub use gamma::GammaModel;

mod params;
pub use params::{NPARAMS, ParameterVector, SanityViolation};

mod single_diode;
pub use single_diode::SingleDiode;

pub mod solver;
pub use solver::{
    AttemptOutcome, AuxiliaryRelation, FitTrace, FixedCandidates, InitialGuess,
    InitialGuessTrait, NewtonDriver, NewtonOptions, TechnologySearch,
};

mod technology;
pub use technology::{BOLTZMANN_EV, Technology};

pub use ndarray;
