use serde::Deserialize;

/// One row of the reference table
///
/// Every field is a primitive, so the table does not depend on the fitter's types. Data-sheet
/// columns come first, the parameters they were synthesized from follow.
#[derive(Clone, Debug, Deserialize)]
pub struct ReferenceModule {
    pub name: String,
    pub technology: String,
    pub vmp: f64,
    pub imp: f64,
    pub voc: f64,
    pub isc: f64,
    pub beta_voc: f64,
    pub alpha_isc: f64,
    pub gamma_pmp: f64,
    pub nser: i32,
    pub tref_degc: f64,
    pub a: f64,
    pub il: f64,
    pub io: f64,
    pub rs: f64,
    pub rsh: f64,
    pub adj: f64,
}

impl ReferenceModule {
    /// Parameters in the `[a, Il, Io, Rs, Rsh]` order
    pub fn parameters(&self) -> [f64; 5] {
        [self.a, self.il, self.io, self.rs, self.rsh]
    }
}
