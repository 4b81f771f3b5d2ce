use std::collections::BTreeMap;

use serde::Serialize;

use crate::market::types::Candle;
use crate::time::MINUTE_MS;

/// Per-symbol statistics over one period of 1-minute candles.
///
/// Produced for completed hours (60 minutes) and for "dynamic" partial hours
/// (whatever minutes have elapsed since the top of the current hour) with the
/// same formulas. All standard deviations are population stddev over the
/// period's minutes.
#[derive(Clone, Debug, Serialize)]
pub struct HourAggregate {
    pub symbol: String,
    /// Open time of the period's first minute (minute-aligned; equal to the
    /// hour boundary for completed hours).
    pub hour_start: i64,
    /// End of the period's last minute.
    pub hour_end: i64,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub high_std: f64,
    pub low_std: f64,
    /// Sum of quote volumes across the period.
    pub total_volume: f64,
    pub quote_volume_mean: f64,
    pub quote_volume_std: f64,
    pub taker_buy_base_mean: f64,
    pub taker_buy_base_std: f64,
    pub taker_buy_quote_mean: f64,
    pub taker_buy_quote_std: f64,
    pub trades_mean: f64,
    pub trades_std: f64,
    pub volatility_mean: f64,
    pub volatility_std: f64,
    /// Minutes that contributed for this symbol.
    pub sample_count: usize,
}

/// Aggregates a chronological run of minute batches into one `HourAggregate`
/// per symbol. Symbols observed in fewer than 2 minutes are skipped (stddev
/// undefined over a single sample).
pub fn aggregate_period(minutes: &[(i64, &[Candle])]) -> Vec<HourAggregate> {
    let mut by_symbol: BTreeMap<&str, Vec<&Candle>> = BTreeMap::new();
    for (_, batch) in minutes {
        for candle in *batch {
            by_symbol.entry(candle.symbol.as_str()).or_default().push(candle);
        }
    }

    let mut out = Vec::with_capacity(by_symbol.len());

    for (symbol, candles) in by_symbol {
        if candles.len() < 2 {
            continue;
        }
        // Minutes iterate oldest-first, so per-symbol candles are already
        // chronological.
        let first = candles[0];
        let last = candles[candles.len() - 1];

        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.quote_volume).collect();
        let taker_base: Vec<f64> = candles.iter().map(|c| c.taker_buy_base_volume).collect();
        let taker_quote: Vec<f64> = candles.iter().map(|c| c.taker_buy_quote_volume).collect();
        let trades: Vec<f64> = candles.iter().map(|c| c.trades as f64).collect();
        let volatilities: Vec<f64> = candles.iter().map(|c| c.volatility()).collect();

        out.push(HourAggregate {
            symbol: symbol.to_string(),
            hour_start: first.open_time,
            hour_end: last.open_time + MINUTE_MS,
            open: first.open,
            close: last.close,
            high: highs.iter().copied().fold(f64::MIN, f64::max),
            low: lows.iter().copied().fold(f64::MAX, f64::min),
            high_std: pop_std(&highs),
            low_std: pop_std(&lows),
            total_volume: volumes.iter().sum(),
            quote_volume_mean: mean(&volumes),
            quote_volume_std: pop_std(&volumes),
            taker_buy_base_mean: mean(&taker_base),
            taker_buy_base_std: pop_std(&taker_base),
            taker_buy_quote_mean: mean(&taker_quote),
            taker_buy_quote_std: pop_std(&taker_quote),
            trades_mean: mean(&trades),
            trades_std: pop_std(&trades),
            volatility_mean: mean(&volatilities),
            volatility_std: pop_std(&volatilities),
            sample_count: candles.len(),
        });
    }

    out
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation (divisor N, not N-1).
fn pop_std(xs: &[f64]) -> f64 {
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
}
