use thiserror::Error;

/// Per-symbol fetch failures. All of these are transient: the symbol is
/// dropped from the current batch and retried on the next tick.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited (http 429)")]
    RateLimited,

    #[error("unexpected http status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed kline payload: {0}")]
    Malformed(String),

    #[error("numeric parse error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("candle at {open_time} is still forming")]
    UnclosedCandle { open_time: i64 },

    #[error("kline range mismatch: expected {expected} minutes, got {got}")]
    RangeMismatch { expected: usize, got: usize },
}
