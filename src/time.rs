//! Epoch-millisecond helpers. All timestamps in the pipeline are `i64`
//! milliseconds since the Unix epoch, minute-aligned where noted.

pub const MINUTE_MS: i64 = 60_000;
pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 86_400_000;

pub const MINUTES_PER_HOUR: usize = 60;

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Rounds down to the containing minute boundary.
pub fn floor_to_minute(ts_ms: i64) -> i64 {
    ts_ms - ts_ms.rem_euclid(MINUTE_MS)
}

/// Rounds down to the containing hour boundary.
pub fn floor_to_hour(ts_ms: i64) -> i64 {
    ts_ms - ts_ms.rem_euclid(HOUR_MS)
}

/// Wall-clock minute within the hour (0..=59).
pub fn minute_of_hour(ts_ms: i64) -> u32 {
    (ts_ms.rem_euclid(HOUR_MS) / MINUTE_MS) as u32
}

/// Start of the containing UTC day. Used as the alert deduplication key.
pub fn utc_day(ts_ms: i64) -> i64 {
    ts_ms - ts_ms.rem_euclid(DAY_MS)
}

/// Open time of the newest 1m candle that is fully closed at `now_ms`.
pub fn last_closed_minute(now_ms: i64) -> i64 {
    floor_to_minute(now_ms) - MINUTE_MS
}
