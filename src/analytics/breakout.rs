use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::analytics::hour::HourAggregate;
use crate::analytics::volume::{VOLUME_BASELINE_HOURS, Volume10m};
use crate::market::types::Candle;

/// Projection factor from the 10-minute rolling volume to a full hour.
pub const HOUR_PROJECTION_FACTOR: f64 = 6.0;

/// Latest close strictly above the rolling maximum high of the horizon.
#[derive(Clone, Debug, Serialize)]
pub struct PriceBreakout {
    pub symbol: String,
    pub close: f64,
    /// Rolling maximum high the close broke through.
    pub level: f64,
    /// `close - level`.
    pub excess: f64,
}

/// Projected next-hour volume above every baseline hour by the configured
/// multiplier.
#[derive(Clone, Debug, Serialize)]
pub struct VolumeSurge {
    pub symbol: String,
    pub projected: f64,
    /// The minimum projection/baseline ratio across the 10 hours, i.e. the
    /// tightest constraint that still passed.
    pub confidence: f64,
}

/// Per-symbol maximum `high` across the given hourly periods.
pub fn rolling_max_highs(periods: &[&[HourAggregate]]) -> BTreeMap<String, f64> {
    let mut highs: BTreeMap<String, f64> = BTreeMap::new();

    for rows in periods {
        for row in *rows {
            highs
                .entry(row.symbol.clone())
                .and_modify(|h| *h = h.max(row.high))
                .or_insert(row.high);
        }
    }

    highs
}

/// Latest known close per symbol from the newest stored minute.
pub fn latest_closes(newest_minute: &[Candle]) -> BTreeMap<String, f64> {
    newest_minute
        .iter()
        .map(|c| (c.symbol.clone(), c.close))
        .collect()
}

/// Emits one candidate per symbol whose latest close exceeds its rolling
/// maximum high, sorted by excess descending. Recomputation from the same
/// inputs is deterministic.
pub fn detect_breakouts(
    closes: &BTreeMap<String, f64>,
    levels: &BTreeMap<String, f64>,
) -> Vec<PriceBreakout> {
    let mut out: Vec<PriceBreakout> = closes
        .iter()
        .filter_map(|(symbol, &close)| {
            let &level = levels.get(symbol)?;
            (close > level).then(|| PriceBreakout {
                symbol: symbol.clone(),
                close,
                level,
                excess: close - level,
            })
        })
        .collect();

    out.sort_by(|a, b| b.excess.total_cmp(&a.excess));
    out
}

/// A symbol surges only if its projected next-hour volume exceeds every one
/// of its 10 baseline hours by at least `multiplier`. A baseline entry <= 0
/// fails the symbol outright (no ratio is defined against a dead hour), and
/// a baseline shorter than 10 periods means the symbol is still warming up.
pub fn detect_volume_surges(
    volumes: &[Volume10m],
    baseline: &BTreeMap<String, Vec<f64>>,
    multiplier: f64,
) -> Vec<VolumeSurge> {
    let mut out = Vec::new();

    for v in volumes {
        let Some(hours) = baseline.get(&v.symbol) else {
            continue;
        };
        if hours.len() < VOLUME_BASELINE_HOURS {
            debug!(symbol = %v.symbol, periods = hours.len(), "baseline incomplete; skipping");
            continue;
        }

        let projected = v.volume * HOUR_PROJECTION_FACTOR;
        let mut confidence = f64::INFINITY;
        let mut triggered = true;

        for &hour_volume in hours {
            if hour_volume <= 0.0 {
                triggered = false;
                break;
            }
            let ratio = projected / hour_volume;
            confidence = confidence.min(ratio);
            if ratio < multiplier {
                triggered = false;
                break;
            }
        }

        if triggered {
            out.push(VolumeSurge {
                symbol: v.symbol.clone(),
                projected,
                confidence,
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::HOUR_MS;

    const BASE: i64 = 1_755_000_000_000;

    fn hour_row(symbol: &str, high: f64) -> HourAggregate {
        HourAggregate {
            symbol: symbol.to_string(),
            hour_start: BASE,
            hour_end: BASE + HOUR_MS,
            open: 1.0,
            close: 1.0,
            high,
            low: 1.0,
            high_std: 0.0,
            low_std: 0.0,
            total_volume: 0.0,
            quote_volume_mean: 0.0,
            quote_volume_std: 0.0,
            taker_buy_base_mean: 0.0,
            taker_buy_base_std: 0.0,
            taker_buy_quote_mean: 0.0,
            taker_buy_quote_std: 0.0,
            trades_mean: 0.0,
            trades_std: 0.0,
            volatility_mean: 0.0,
            volatility_std: 0.0,
            sample_count: 60,
        }
    }

    fn vol(symbol: &str, volume: f64) -> Volume10m {
        Volume10m {
            symbol: symbol.to_string(),
            volume,
            open_time: BASE,
            close_time: BASE,
        }
    }

    fn baseline(symbol: &str, hours: &[f64]) -> BTreeMap<String, Vec<f64>> {
        BTreeMap::from([(symbol.to_string(), hours.to_vec())])
    }

    #[test]
    fn max_high_spans_all_periods() {
        let a = vec![hour_row("AAA", 10.0), hour_row("BBB", 3.0)];
        let b = vec![hour_row("AAA", 12.0)];
        let c: Vec<HourAggregate> = Vec::new();

        let highs = rolling_max_highs(&[&a, &b, &c]);
        assert_eq!(highs["AAA"], 12.0);
        assert_eq!(highs["BBB"], 3.0);
    }

    #[test]
    fn breakout_fires_iff_close_exceeds_level() {
        let levels = BTreeMap::from([("AAA".to_string(), 12.0)]);

        let below = BTreeMap::from([("AAA".to_string(), 12.0)]);
        assert!(detect_breakouts(&below, &levels).is_empty());

        let above = BTreeMap::from([("AAA".to_string(), 12.5)]);
        let signals = detect_breakouts(&above, &levels);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].symbol, "AAA");
        assert!((signals[0].excess - 0.5).abs() < 1e-12);
    }

    #[test]
    fn breakout_toggles_deterministically_with_one_hour() {
        // Raising one contributing hour above the close must suppress the
        // signal; restoring it must bring the signal back, byte for byte.
        let closes = BTreeMap::from([("AAA".to_string(), 11.0)]);

        let low = vec![hour_row("AAA", 10.0)];
        let spike = vec![hour_row("AAA", 11.5)];
        let rest = vec![hour_row("AAA", 9.0)];

        let fired = detect_breakouts(&closes, &rolling_max_highs(&[&rest, &low]));
        assert_eq!(fired.len(), 1);

        let suppressed = detect_breakouts(&closes, &rolling_max_highs(&[&rest, &spike]));
        assert!(suppressed.is_empty());

        let fired_again = detect_breakouts(&closes, &rolling_max_highs(&[&rest, &low]));
        assert_eq!(fired_again.len(), 1);
        assert_eq!(fired_again[0].excess, fired[0].excess);
    }

    #[test]
    fn breakouts_sorted_by_excess_descending() {
        let closes = BTreeMap::from([
            ("AAA".to_string(), 11.0),
            ("BBB".to_string(), 20.0),
        ]);
        let levels = BTreeMap::from([
            ("AAA".to_string(), 10.0),
            ("BBB".to_string(), 15.0),
        ]);

        let signals = detect_breakouts(&closes, &levels);
        assert_eq!(signals[0].symbol, "BBB");
        assert_eq!(signals[1].symbol, "AAA");
    }

    #[test]
    fn surge_confidence_is_the_minimum_ratio() {
        // projected = 100 * 6 = 600; ratios 6.0 against every hour.
        let volumes = vec![vol("AAA", 100.0)];
        let hours = baseline("AAA", &[100.0; 10]);

        let surges = detect_volume_surges(&volumes, &hours, 5.0);
        assert_eq!(surges.len(), 1);
        assert!((surges[0].confidence - 6.0).abs() < 1e-12);
        assert_eq!(surges[0].projected, 600.0);
    }

    #[test]
    fn one_heavy_hour_blocks_the_surge() {
        // Nine hours of 100 plus one of 1000: projected 1200 clears the nine
        // (ratio 12) but only reaches 1.2 against the heavy hour.
        let mut hours = vec![100.0; 9];
        hours.push(1000.0);

        let surges = detect_volume_surges(&[vol("AAA", 200.0)], &baseline("AAA", &hours), 5.0);
        assert!(surges.is_empty());
    }

    #[test]
    fn zero_volume_hour_blocks_the_surge() {
        let mut hours = vec![100.0; 10];
        hours[3] = 0.0;

        let surges = detect_volume_surges(&[vol("AAA", 10_000.0)], &baseline("AAA", &hours), 5.0);
        assert!(surges.is_empty());
    }

    #[test]
    fn short_baseline_is_skipped() {
        let surges = detect_volume_surges(&[vol("AAA", 10_000.0)], &baseline("AAA", &[100.0; 9]), 5.0);
        assert!(surges.is_empty());
    }
}
