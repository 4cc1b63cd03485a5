use crate::clock::{Clock, MonotonicClock};
use crate::datasheet::Datasheet;
use crate::error::FitError;
use crate::gamma::GammaModel;
use crate::params::ParameterVector;
use crate::solver::newton::{FitTrace, NewtonDriver, NewtonOptions};
use crate::solver::residuals::{AuxiliaryRelation, ResidualSystem};
use crate::solver::seeds::{InitialGuess, InitialGuessTrait};
use crate::technology::Technology;

use macro_const::macro_const;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info_span};

macro_const! {
    const DOC: &str = r#"
Six-parameter single-diode model fit

Fits the parameters of the single-diode equivalent circuit of a photovoltaic module

$$
I = I_L - I_o \left(\mathrm{e}^{(V + I R_s)/a} - 1\right) - \frac{V + I R_s}{R_{sh}}
$$

to the module data sheet: maximum power point, open-circuit voltage, short-circuit current and
temperature coefficients of open-circuit voltage, short-circuit current and maximum power.

- Fit parameters: **a**, **Il**, **Io**, **Rs**, **Rsh**
- Derived parameter: **Adj**, percentage correction of the short-circuit current temperature
  coefficient reproducing the maximum power temperature coefficient
- Technologies: monocrystalline and multicrystalline silicon, CIS, CIGS, CdTe, amorphous silicon

The four operating points give four equations, the fifth one is the first auxiliary relation
with a physically sane root: the open-circuit point at a 10 K higher temperature, then a
technology-typical ratio of shunt to series resistance.
"#;
}

#[doc = DOC!()]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename = "ParameterFitter")]
pub struct ParameterFitter {
    options: NewtonOptions,
    initial_guess: InitialGuess,
    relations: Vec<AuxiliaryRelation>,
}

/// Successful fit
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FitResult {
    pub technology: Technology,
    /// Fifth equation the parameters satisfy
    pub relation: AuxiliaryRelation,
    pub parameters: ParameterVector,
    pub adj: f64,
    pub trace: FitTrace,
    pub elapsed: Duration,
}

impl ParameterFitter {
    /// New [ParameterFitter] instance
    ///
    /// `options` control the damped Newton iteration, `initial_guess` selects where iterations
    /// start from: [InitialGuess::technology] derives guesses from the data sheet and the
    /// technology, [InitialGuess::fixed] uses the same user-supplied guesses for every fit.
    /// `relations` are tried in order, every one of them from all the initial guesses.
    pub fn new(
        options: NewtonOptions,
        initial_guess: InitialGuess,
        relations: Vec<AuxiliaryRelation>,
    ) -> Self {
        assert!(!relations.is_empty(), "relations must not be empty");
        Self {
            options,
            initial_guess,
            relations,
        }
    }

    #[inline]
    pub fn default_options() -> NewtonOptions {
        NewtonOptions::default()
    }

    #[inline]
    pub fn default_initial_guess() -> InitialGuess {
        InitialGuess::technology()
    }

    #[inline]
    pub fn default_relations() -> Vec<AuxiliaryRelation> {
        vec![
            AuxiliaryRelation::ElevatedOpenCircuit,
            AuxiliaryRelation::ShuntSeriesRatio,
        ]
    }

    pub const fn doc() -> &'static str {
        DOC
    }

    pub fn options(&self) -> &NewtonOptions {
        &self.options
    }

    pub fn initial_guess(&self) -> &InitialGuess {
        &self.initial_guess
    }

    pub fn relations(&self) -> &[AuxiliaryRelation] {
        &self.relations
    }

    /// Fit the module described by a technology label and a data sheet
    pub fn fit(&self, label: &str, datasheet: &Datasheet) -> Result<FitResult, FitError> {
        self.fit_with_clock(label, datasheet, &MonotonicClock::new())
    }

    /// Same as [Self::fit], `clock` only measures [FitResult::elapsed]
    pub fn fit_with_clock<C: Clock>(
        &self,
        label: &str,
        datasheet: &Datasheet,
        clock: &C,
    ) -> Result<FitResult, FitError> {
        let start = clock.now();
        let _span = info_span!("fit", label).entered();

        let technology = Technology::classify(label)?;
        let cell = datasheet.validate()?;
        let candidates = self.initial_guess.candidates(&cell, technology);
        let driver = NewtonDriver::new(self.options.clone());

        let mut trace = FitTrace::default();
        let mut found = None;
        for &relation in self.relations.iter() {
            let system = ResidualSystem::new(&cell, technology, relation);
            match driver.solve(&system, &candidates, |params| {
                params.check_sanity(&cell, technology)
            }) {
                Ok(mut solution) => {
                    trace.attempts.append(&mut solution.trace.attempts);
                    found = Some((relation, solution.parameters));
                    break;
                }
                Err(failed) => {
                    debug!(%relation, attempts = failed.attempts.len(), "no sane root");
                    trace.attempts.extend(failed.attempts);
                }
            }
        }
        let Some((relation, parameters)) = found else {
            return Err(FitError::SolveFailed {
                attempts: trace.attempts.len(),
                last: trace.last_outcome(),
            });
        };
        let adj = GammaModel::new(technology).adjustment(&cell, &parameters);

        let elapsed = clock.elapsed_since(start);
        debug!(
            %technology,
            %relation,
            attempts = trace.attempts.len(),
            iterations = trace.total_iterations(),
            ?elapsed,
            "fit done"
        );
        Ok(FitResult {
            technology,
            relation,
            parameters,
            adj,
            trace,
            elapsed,
        })
    }
}

impl Default for ParameterFitter {
    fn default() -> Self {
        Self::new(
            Self::default_options(),
            Self::default_initial_guess(),
            Self::default_relations(),
        )
    }
}

/// Host-facing fit result, parameters are zero unless `status` is zero
///
/// Status codes: `0` success, `1` unknown technology label, `2` invalid data sheet or no
/// physically sane solution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FitOutput {
    pub status: i32,
    pub a: f64,
    pub il: f64,
    pub io: f64,
    pub rs: f64,
    pub rsh: f64,
    pub adj: f64,
}

impl From<Result<FitResult, FitError>> for FitOutput {
    fn from(result: Result<FitResult, FitError>) -> Self {
        match result {
            Ok(FitResult {
                parameters: ParameterVector { a, il, io, rs, rsh },
                adj,
                ..
            }) => Self {
                status: 0,
                a,
                il,
                io,
                rs,
                rsh,
                adj,
            },
            Err(error) => {
                debug!(%error, "fit failed");
                Self {
                    status: error.status(),
                    ..Self::default()
                }
            }
        }
    }
}

/// Fit a module with the default [ParameterFitter]
///
/// `tref_degc` is the reference temperature of the data sheet in degrees Celsius.
#[allow(clippy::too_many_arguments)]
pub fn fit(
    celltype: &str,
    vmp: f64,
    imp: f64,
    voc: f64,
    isc: f64,
    beta_voc: f64,
    alpha_isc: f64,
    gamma_pmp: f64,
    nser: i32,
    tref_degc: f64,
) -> FitOutput {
    let datasheet = Datasheet {
        vmp,
        imp,
        voc,
        isc,
        beta_voc,
        alpha_isc,
        gamma_pmp,
        nser,
        tref_degc,
    };
    ParameterFitter::default().fit(celltype, &datasheet).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::clock::FixedClock;
    use crate::datasheet::CELSIUS_TO_KELVIN;
    use crate::error::DatasheetError;
    use crate::single_diode::SingleDiode;
    use crate::solver::newton::{AttemptOutcome, DivergenceReason};
    use crate::technology::BOLTZMANN_EV;
    use crate::tests::*;

    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rayon::prelude::*;

    check_doc_static_method!(doc_static_method, ParameterFitter);
    serde_json_test!(ser_json_de, ParameterFitter, ParameterFitter::default());
    check_partial_eq!(partial_eq, ParameterFitter, ParameterFitter::default());

    #[test]
    fn reference_round_trip() {
        let fitter = ParameterFitter::default();
        for module in REFERENCE_MODULES.iter() {
            let result = fitter
                .fit(&module.technology, &reference_datasheet(module))
                .unwrap();
            assert_relative_eq!(
                &result.parameters.to_array()[..],
                &module.parameters()[..],
                max_relative = 1e-4
            );
            assert_abs_diff_eq!(result.adj, module.adj, epsilon = 1e-3);
        }
    }

    #[test]
    fn canonical_mono_si() {
        let output = fit("monoSi", 29.65, 5.227, 36.44, 5.625, -0.171, 0.0028, -0.577, 60, 25.0);
        assert_eq!(output.status, 0);
        assert!((0.1..=1.0).contains(&output.rs), "Rs = {}", output.rs);
        assert!(output.rsh > 100.0, "Rsh = {}", output.rsh);
        assert!((1.2..=2.2).contains(&output.a), "a = {}", output.a);
        assert_relative_eq!(output.il, 5.625, max_relative = 0.01);
        assert!((1e-9..=1e-7).contains(&output.io), "Io = {}", output.io);

        assert_relative_eq!(output.a, 1.749019, max_relative = 1e-5);
        assert_relative_eq!(output.il, 5.629914, max_relative = 1e-5);
        assert_relative_eq!(output.io, 4.955505e-9, max_relative = 1e-5);
        assert_relative_eq!(output.rs, 0.349333, max_relative = 1e-5);
        assert_relative_eq!(output.rsh, 399.8502, max_relative = 1e-5);
        assert_abs_diff_eq!(output.adj, 0.5743, epsilon = 1e-3);
    }

    #[test]
    fn shunt_series_ratio_fallback() {
        let output = fit("monoSi", 28.4, 5.3, 36.2, 5.6, -0.12, 0.0028, -0.4, 60, 25.0);
        assert_eq!(output.status, 0);
        assert!((0.1..=1.0).contains(&output.rs), "Rs = {}", output.rs);
        assert!(output.rsh > 100.0, "Rsh = {}", output.rsh);
        assert!((1.2..=2.2).contains(&output.a), "a = {}", output.a);
        assert_relative_eq!(output.il, 5.6, max_relative = 0.01);
        assert!(output.adj.is_finite());

        assert_relative_eq!(output.a, 1.302105, max_relative = 1e-4);
        assert_relative_eq!(output.il, 5.602800, max_relative = 1e-4);
        assert_relative_eq!(output.io, 4.705644e-12, max_relative = 1e-4);
        assert_relative_eq!(output.rs, 0.737445, max_relative = 1e-4);
        assert_relative_eq!(output.rsh, 1474.890, max_relative = 1e-4);
        assert_abs_diff_eq!(output.adj, 126.653, epsilon = 0.05);

        // no root of the elevated-temperature relation has a positive shunt resistance
        let result = ParameterFitter::default()
            .fit(
                "monoSi",
                &Datasheet {
                    vmp: 28.4,
                    imp: 5.3,
                    voc: 36.2,
                    isc: 5.6,
                    beta_voc: -0.12,
                    alpha_isc: 0.0028,
                    gamma_pmp: -0.4,
                    nser: 60,
                    tref_degc: 25.0,
                },
            )
            .unwrap();
        assert_eq!(result.relation, AuxiliaryRelation::ShuntSeriesRatio);
        assert_eq!(result.trace.attempts.len(), 16);
        for record in &result.trace.attempts[..15] {
            assert_eq!(record.relation, AuxiliaryRelation::ElevatedOpenCircuit);
            assert_eq!(
                record.outcome,
                AttemptOutcome::Diverged(DivergenceReason::LeftAdmissibleRegion)
            );
        }
        let last = result.trace.attempts[15];
        assert_eq!(last.relation, AuxiliaryRelation::ShuntSeriesRatio);
        assert_eq!(last.candidate, 0);
        assert_eq!(last.outcome, AttemptOutcome::Converged);
    }

    #[test]
    fn single_relation_fails() {
        let fitter = ParameterFitter::new(
            NewtonOptions::default(),
            InitialGuess::default(),
            vec![AuxiliaryRelation::ElevatedOpenCircuit],
        );
        let datasheet = Datasheet {
            vmp: 28.4,
            imp: 5.3,
            voc: 36.2,
            isc: 5.6,
            beta_voc: -0.12,
            alpha_isc: 0.0028,
            gamma_pmp: -0.4,
            nser: 60,
            tref_degc: 25.0,
        };
        let error = fitter.fit("monoSi", &datasheet).unwrap_err();
        assert_eq!(
            error,
            FitError::SolveFailed {
                attempts: 15,
                last: Some(AttemptOutcome::Diverged(
                    DivergenceReason::LeftAdmissibleRegion
                )),
            }
        );
        assert_eq!(FitOutput::from(Err(error)).status, 2);
    }

    #[test]
    fn empty_candidate_list() {
        let fitter: ParameterFitter = serde_json::from_value(serde_json::json!({
            "options": NewtonOptions::default(),
            "initial_guess": {"Fixed": {"candidates": []}},
            "relations": ["ElevatedOpenCircuit", "ShuntSeriesRatio"],
        }))
        .unwrap();
        let module = reference_module("canonical-mono-60");
        let error = fitter
            .fit(&module.technology, &reference_datasheet(module))
            .unwrap_err();
        assert_eq!(
            error,
            FitError::SolveFailed {
                attempts: 0,
                last: None,
            }
        );
        assert_eq!(
            error.to_string(),
            "no physically sane root after 0 attempts"
        );
    }

    #[test]
    fn unknown_technology() {
        let output = fit("unknown", 29.65, 5.227, 36.44, 5.625, -0.171, 0.0028, -0.577, 60, 25.0);
        assert_eq!(
            output,
            FitOutput {
                status: 1,
                ..FitOutput::default()
            }
        );
    }

    #[test]
    fn zero_short_circuit_current_or_open_circuit_voltage() {
        for (voc, isc) in [(36.44, 0.0), (0.0, 5.625), (0.0, 0.0)] {
            let output = fit("monoSi", 29.65, 5.227, voc, isc, -0.171, 0.0028, -0.577, 60, 25.0);
            assert_eq!(output.status, 2);
            assert_eq!(output, FitOutput { status: 2, ..FitOutput::default() });
        }
        let error = ParameterFitter::default()
            .fit(
                "monoSi",
                &Datasheet {
                    isc: 0.0,
                    ..reference_datasheet(reference_module("canonical-mono-60"))
                },
            )
            .unwrap_err();
        assert!(matches!(
            error,
            FitError::InvalidDatasheet(DatasheetError::NonPositive { name: "Isc", .. })
        ));
    }

    #[test]
    fn ill_conditioned_terminates() {
        for vmp in [36.19, 36.2, 36.3] {
            let output = fit("monoSi", vmp, 5.227, 36.2, 5.625, -0.171, 0.0028, -0.577, 60, 25.0);
            assert!(output.status == 0 || output.status == 2);
            assert!(output.a.is_finite() && output.rsh.is_finite() && output.adj.is_finite());
        }
        let output = fit("monoSi", 29.65, 5.624999, 36.44, 5.625, -0.171, 0.0028, -0.577, 60, 25.0);
        assert!(output.status == 0 || output.status == 2);
    }

    #[test]
    fn idempotent() {
        let module = reference_module("cigs-100");
        let fitter = ParameterFitter::default();
        let datasheet = reference_datasheet(module);
        let first = fitter.fit(&module.technology, &datasheet).unwrap();
        let second = fitter.fit(&module.technology, &datasheet).unwrap();
        assert_eq!(
            first.parameters.to_array().map(f64::to_bits),
            second.parameters.to_array().map(f64::to_bits)
        );
        assert_eq!(first.adj.to_bits(), second.adj.to_bits());
        assert_eq!(first.trace, second.trace);
    }

    #[test]
    fn idempotent_across_threads() {
        let fitter = ParameterFitter::default();
        let serial: Vec<_> = REFERENCE_MODULES
            .iter()
            .map(|module| FitOutput::from(fitter.fit(&module.technology, &reference_datasheet(module))))
            .collect();
        let parallel: Vec<_> = REFERENCE_MODULES
            .par_iter()
            .map(|module| FitOutput::from(fitter.fit(&module.technology, &reference_datasheet(module))))
            .collect();
        assert_eq!(serial.len(), parallel.len());
        for (s, p) in serial.iter().zip(parallel.iter()) {
            assert_eq!(s.status, 0);
            assert_eq!(s.a.to_bits(), p.a.to_bits());
            assert_eq!(s.io.to_bits(), p.io.to_bits());
            assert_eq!(s.adj.to_bits(), p.adj.to_bits());
        }
    }

    #[test]
    fn fixed_clock_elapsed() {
        let module = reference_module("cdte-154");
        let clock = FixedClock::new(Duration::from_millis(250));
        let result = ParameterFitter::default()
            .fit_with_clock(&module.technology, &reference_datasheet(module), &clock)
            .unwrap();
        assert_eq!(result.elapsed, Duration::ZERO);
        assert_eq!(result.technology, Technology::CdTe);
    }

    #[test]
    fn fixed_initial_guess() {
        let module = reference_module("canonical-mono-60");
        let datasheet = reference_datasheet(module);
        let fitter = ParameterFitter::new(
            NewtonOptions::default(),
            InitialGuess::fixed(vec![
                // a = 0.01 overflows the open-circuit exponent
                ParameterVector::new(0.01, 5.6, 1e-9, 0.3, 300.0),
                ParameterVector::new(1.6, 5.6, 1e-9, 0.3, 300.0),
            ]),
            ParameterFitter::default_relations(),
        );
        let result = fitter.fit("mono", &datasheet).unwrap();
        assert_eq!(result.trace.attempts.len(), 2);
        assert_eq!(result.trace.attempts[1].outcome, AttemptOutcome::Converged);
        assert_relative_eq!(
            &result.parameters.to_array()[..],
            &module.parameters()[..],
            max_relative = 1e-4
        );
    }

    #[test]
    fn synthetic_modules_round_trip() {
        const N: usize = 20;
        const T_REF: f64 = 298.15;

        let mut rng = StdRng::seed_from_u64(0);
        let fitter = ParameterFitter::default();
        for technology in Technology::ALL {
            let (nser_choices, ideality): (&[i32], (f64, f64)) = match technology {
                Technology::MonoSi => (&[36, 60, 72, 96], (0.9, 1.6)),
                Technology::MultiSi => (&[60, 72], (0.9, 1.6)),
                Technology::Cis => (&[60, 110], (1.1, 2.2)),
                Technology::Cigs => (&[60, 100], (1.1, 2.2)),
                Technology::CdTe => (&[116, 154], (1.1, 2.2)),
                Technology::Amorphous => (&[36, 100], (1.4, 3.0)),
            };
            for _ in 0..N {
                let nser = *nser_choices.choose(&mut rng).unwrap();
                let n = rng.random_range(ideality.0..ideality.1);
                let a = n * nser as f64 * BOLTZMANN_EV * T_REF;
                let il = rng.random_range(1.0..12.0);
                let voc_cell = rng.random_range(0.5..0.7) * technology.band_gap() / 1.121;
                let io = il * f64::exp(-voc_cell * nser as f64 / a);
                let rs = rng.random_range(0.1..0.5) * 0.05 * nser as f64 * voc_cell / il;
                let rsh = rng.random_range(50.0..400.0) * nser as f64 * voc_cell / il;
                let expected = ParameterVector::new(a, il, io, rs, rsh);

                let datasheet = SingleDiode::new(expected).datasheet(
                    technology,
                    nser,
                    T_REF - CELSIUS_TO_KELVIN,
                    5e-4 * il,
                    0.0,
                );
                let result = fitter
                    .fit(&technology.to_string(), &datasheet)
                    .unwrap_or_else(|error| panic!("{technology}: {expected:?}: {error}"));
                assert_relative_eq!(
                    &result.parameters.to_array()[..],
                    &expected.to_array()[..],
                    max_relative = 1e-4
                );
            }
        }
    }

    #[test]
    fn json_schema() {
        let schema = schemars::schema_for!(ParameterFitter);
        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("max_iterations"));
        assert!(json.contains("shunt_scales"));
        assert!(json.contains("candidates"));
        assert!(json.contains("ShuntSeriesRatio"));
    }

    #[test]
    fn result_serialization() {
        let module = reference_module("monoSi-60");
        let result = ParameterFitter::default()
            .fit(&module.technology, &reference_datasheet(module))
            .unwrap();
        let json: serde_json::Value = serde_json::to_value(&result).unwrap();
        assert_eq!(json["technology"], "MonoSi");
        assert_eq!(json["relation"], "ElevatedOpenCircuit");
        assert_eq!(json["trace"]["attempts"][0]["relation"], "ElevatedOpenCircuit");
        assert_eq!(json["trace"]["attempts"][0]["outcome"], "Converged");
        assert_eq!(json["parameters"]["a"].as_f64(), Some(result.parameters.a));
    }
}
