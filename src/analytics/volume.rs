use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::analytics::hour::HourAggregate;
use crate::market::types::Candle;

/// Minutes contributing to the short rolling volume window.
pub const VOLUME_WINDOW_MINUTES: usize = 10;

/// Hourly periods in the volume-surge baseline.
pub const VOLUME_BASELINE_HOURS: usize = 10;

/// Rolling quote-volume over the 10 most recent minutes for one symbol.
/// Fully recomputed every tick; replaces the previous value.
#[derive(Clone, Debug, Serialize)]
pub struct Volume10m {
    pub symbol: String,
    pub volume: f64,
    /// Open time of the window's oldest minute.
    pub open_time: i64,
    /// Open time of the window's newest minute.
    pub close_time: i64,
}

/// Sums quote volume per symbol across exactly the 10 most recent minutes.
///
/// `minutes` is the store snapshot from `recent(VOLUME_WINDOW_MINUTES)`.
/// Returns `None` while fewer than 10 minutes are stored; a partial window
/// would produce a silently wrong baseline.
pub fn volumes_10m(minutes: &[(i64, &[Candle])]) -> Option<Vec<Volume10m>> {
    if minutes.len() < VOLUME_WINDOW_MINUTES {
        debug!(
            have = minutes.len(),
            need = VOLUME_WINDOW_MINUTES,
            "not enough minutes for the 10m volume window"
        );
        return None;
    }

    let window = &minutes[minutes.len() - VOLUME_WINDOW_MINUTES..];
    let open_time = window[0].0;
    let close_time = window[window.len() - 1].0;

    let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
    for (_, batch) in window {
        for candle in *batch {
            *sums.entry(candle.symbol.as_str()).or_default() += candle.quote_volume;
        }
    }

    Some(
        sums.into_iter()
            .map(|(symbol, volume)| Volume10m {
                symbol: symbol.to_string(),
                volume,
                open_time,
                close_time,
            })
            .collect(),
    )
}

/// Builds, per symbol, the ordered list (oldest first) of per-hour
/// `total_volume` values over the most recent `VOLUME_BASELINE_HOURS` periods.
///
/// `history` holds completed hours oldest first; `dynamic` is the current
/// partial-hour aggregate and always counts as the newest period. Returns
/// `None` until enough hourly periods exist. Symbols missing from some
/// periods end up with shorter lists; the surge detector skips those.
pub fn volume_matrix(
    history: &[&[HourAggregate]],
    dynamic: &[HourAggregate],
) -> Option<BTreeMap<String, Vec<f64>>> {
    let mut periods: Vec<&[HourAggregate]> = history.to_vec();
    periods.push(dynamic);

    if periods.len() < VOLUME_BASELINE_HOURS {
        debug!(
            have = periods.len(),
            need = VOLUME_BASELINE_HOURS,
            "not enough hourly periods for the volume baseline"
        );
        return None;
    }

    let skip = periods.len() - VOLUME_BASELINE_HOURS;
    let mut matrix: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for rows in periods.into_iter().skip(skip) {
        for row in rows {
            matrix
                .entry(row.symbol.clone())
                .or_default()
                .push(row.total_volume);
        }
    }

    Some(matrix)
}
