use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("symbol universe is empty")]
    EmptySymbolUniverse,

    #[error("backfill incomplete: {got}/{want} minutes stored")]
    BackfillIncomplete { got: usize, want: usize },

    #[error("candle store failed consistency check")]
    StoreInconsistent,
}
