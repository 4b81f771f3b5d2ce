use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::market::client::KlineSource;
use crate::market::errors::FetchError;
use crate::market::rate_limiter::RateLimiter;
use crate::market::types::Candle;
use crate::time::{MINUTE_MS, now_ms};

/// Fan-out kline fetcher for a whole symbol universe.
///
/// One task per symbol, bounded by a semaphore and gated by the shared
/// `RateLimiter`. Per-symbol failures are non-fatal: the symbol is dropped
/// from the batch with a warning and retried on the next tick. Results are
/// transposed from per-symbol chronological series into per-minute batches
/// ready for `CandleStore::insert`.
pub struct ConcurrentFetcher<S> {
    source: Arc<S>,
    limiter: Arc<RateLimiter>,
    semaphore: Arc<Semaphore>,
    rate_limit_backoff: Duration,
}

impl<S: KlineSource + 'static> ConcurrentFetcher<S> {
    pub fn new(
        source: Arc<S>,
        limiter: Arc<RateLimiter>,
        concurrency: usize,
        rate_limit_backoff: Duration,
    ) -> Self {
        Self {
            source,
            limiter,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            rate_limit_backoff,
        }
    }

    /// Fetches `count` closed minutes ending at `end_minute` (the open time of
    /// the newest requested minute) for every symbol.
    ///
    /// Returns per-minute candle batches, index 0 = oldest minute. Every batch
    /// holds the same symbol set: a symbol either passes validation for the
    /// whole range or is omitted from every slot.
    pub async fn fetch_window(
        &self,
        symbols: &[String],
        count: usize,
        end_minute: i64,
    ) -> Vec<Vec<Candle>> {
        if count == 0 || symbols.is_empty() {
            return Vec::new();
        }

        let end_time = end_minute + MINUTE_MS - 1;
        let total = symbols.len();

        let mut tasks = FuturesUnordered::new();
        for symbol in symbols {
            let symbol = symbol.clone();
            let source = Arc::clone(&self.source);
            let limiter = Arc::clone(&self.limiter);
            let semaphore = Arc::clone(&self.semaphore);
            let backoff = self.rate_limit_backoff;

            tasks.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                limiter.acquire().await;

                match source.fetch_klines(&symbol, count, end_time).await {
                    Ok(candles) => match validate_series(&symbol, candles, count, end_minute) {
                        Ok(series) => Some(series),
                        Err(e) => {
                            warn!(symbol = %symbol, error = %e, "kline series rejected; symbol dropped for this batch");
                            None
                        }
                    },
                    Err(FetchError::RateLimited) => {
                        warn!(symbol = %symbol, "rate limited by exchange; backing off");
                        tokio::time::sleep(backoff).await;
                        None
                    }
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "kline fetch failed; symbol dropped for this batch");
                        None
                    }
                }
            }));
        }

        let mut series: Vec<Vec<Candle>> = Vec::with_capacity(total);
        let mut completed = 0usize;

        while let Some(joined) = tasks.next().await {
            match joined {
                Ok(Some(candles)) => series.push(candles),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "fetch task panicked"),
            }
            completed += 1;
            if completed % 300 == 0 {
                info!(completed, total, "kline batch progress");
            }
        }

        debug!(
            symbols_ok = series.len(),
            symbols_total = total,
            minutes = count,
            "kline batch collected"
        );

        transpose(series, count)
    }
}

/// Checks one symbol's series against the requested range: right length,
/// contiguous minute-aligned open times, every candle closed.
fn validate_series(
    symbol: &str,
    candles: Vec<Candle>,
    count: usize,
    end_minute: i64,
) -> Result<Vec<Candle>, FetchError> {
    if candles.len() != count {
        return Err(FetchError::RangeMismatch {
            expected: count,
            got: candles.len(),
        });
    }

    let start_minute = end_minute - (count as i64 - 1) * MINUTE_MS;
    let now = now_ms();

    for (i, candle) in candles.iter().enumerate() {
        let expected_open = start_minute + i as i64 * MINUTE_MS;
        if candle.open_time != expected_open {
            return Err(FetchError::Malformed(format!(
                "{symbol}: open_time {} at index {i}, expected {expected_open}",
                candle.open_time
            )));
        }
        if candle.close_time >= now {
            return Err(FetchError::UnclosedCandle {
                open_time: candle.open_time,
            });
        }
    }

    Ok(candles)
}

/// Turns per-symbol chronological series into per-minute cross sections.
/// Every input series has exactly `count` candles (validated above), so every
/// output slot holds the same symbol count.
fn transpose(series: Vec<Vec<Candle>>, count: usize) -> Vec<Vec<Candle>> {
    let mut minutes: Vec<Vec<Candle>> = (0..count).map(|_| Vec::new()).collect();

    for symbol_series in series {
        for (i, candle) in symbol_series.into_iter().enumerate() {
            minutes[i].push(candle);
        }
    }

    minutes
}
