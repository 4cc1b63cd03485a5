use csv_parser::modules_from_reader;
use lazy_static::lazy_static;
pub use record::ReferenceModule;
use types::Error;

mod csv_parser;
mod record;
mod types;

const REFERENCE_MODULES_CSV: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/reference_modules.csv"));

lazy_static! {
    /// Synthetic data sheets produced by a forward single-diode evaluation of known parameters
    pub static ref REFERENCE_MODULES: Vec<ReferenceModule> =
        modules_from_reader(REFERENCE_MODULES_CSV.as_bytes()).unwrap();
}

pub fn reference_module(name: &str) -> &'static ReferenceModule {
    REFERENCE_MODULES
        .iter()
        .find(|module| module.name == name)
        .unwrap_or_else(|| panic!("no reference module named {name}"))
}
