use crate::modules::{Error, ReferenceModule};

use std::io::Read;

pub(super) fn modules_from_reader<R>(reader: R) -> Result<Vec<ReferenceModule>, Error>
where
    R: Read,
{
    let mut csv_reader = csv::ReaderBuilder::new().from_reader(reader);
    let modules = csv_reader
        .deserialize()
        .collect::<Result<Vec<ReferenceModule>, _>>()?;
    if modules.is_empty() {
        return Err(Error::Empty);
    }
    Ok(modules)
}
