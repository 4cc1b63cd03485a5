#[derive(Debug, thiserror::Error)]
pub(super) enum Error {
    #[error(transparent)]
    CsvError(#[from] csv::Error),

    #[error("reference module table is empty")]
    Empty,
}
