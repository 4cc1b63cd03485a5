pub use modules::{REFERENCE_MODULES, ReferenceModule, reference_module};

mod modules;
