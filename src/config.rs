use std::time::Duration;

use tracing::warn;

use crate::time::MINUTES_PER_HOUR;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Base URL of the futures REST API.
    pub api_base_url: String,

    // =========================
    // Window configuration
    // =========================
    /// Length of the sliding candle window, in minutes. Never less than a
    /// full hour: the hourly rollover reads 60 minutes out of the window.
    ///
    /// The store never holds more than this many minute buckets; the oldest
    /// bucket is evicted when a newer one arrives. Startup backfill must fill
    /// the window completely before the tick loop starts.
    pub window_minutes: usize,

    /// Completed hourly aggregates retained for breakout and volume baselines.
    ///
    /// Must cover at least `breakout_hours + 1` (the minute-0 edge) and the
    /// 10-period volume baseline.
    pub hour_history_limit: usize,

    // =========================
    // Signal configuration
    // =========================
    /// Completed hours contributing to the breakout level.
    ///
    /// At minute 0 of the hour one extra completed hour is included, so the
    /// level always spans the same wall-clock horizon. The current partial
    /// hour is appended on top of this count.
    pub breakout_hours: usize,

    /// A volume surge triggers only if the projected next-hour volume exceeds
    /// every one of the 10 historical hourly volumes by this factor.
    pub surge_multiplier: f64,

    // =========================
    // Fetch configuration
    // =========================
    /// Global budget of API requests per rolling 60-second window.
    pub rate_limit_per_minute: usize,

    /// Maximum concurrent kline requests per batch.
    ///
    /// Kept well below the rate budget so a full batch does not queue up a
    /// minute of waiting behind the limiter.
    pub fetch_concurrency: usize,

    /// Per-request HTTP timeout. A symbol whose request exceeds this is
    /// dropped from the batch, never blocking the tick.
    pub request_timeout: Duration,

    /// Extra sleep after an HTTP 429 before the worker gives the symbol up
    /// for this batch.
    pub rate_limit_backoff: Duration,

    /// Symbols starting or ending with this marker are excluded from the
    /// tradable universe (stable-coin pairs carry no signal).
    pub stable_marker: String,

    // =========================
    // Scheduler configuration
    // =========================
    /// Delay after the minute boundary before the tick fires, giving the
    /// exchange time to close the candle.
    pub tick_offset_ms: i64,

    /// Bound on the in-memory alert history.
    pub alert_history_limit: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_base_url: std::env::var("API_BASE_URL")
                .unwrap_or_else(|_| defaults.api_base_url.clone()),
            window_minutes: env_usize("WINDOW_MINUTES", defaults.window_minutes),
            hour_history_limit: env_usize("HOUR_HISTORY_LIMIT", defaults.hour_history_limit),
            breakout_hours: env_usize("BREAKOUT_HOURS", defaults.breakout_hours),
            surge_multiplier: env_f64("SURGE_MULTIPLIER", defaults.surge_multiplier),
            rate_limit_per_minute: env_usize("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            fetch_concurrency: env_usize("FETCH_CONCURRENCY", defaults.fetch_concurrency),
            ..defaults
        }
        .sanitized()
    }

    /// A window shorter than one hour would never arm the hourly rollover,
    /// leaving both detectors permanently off. Raise it instead.
    fn sanitized(mut self) -> Self {
        if self.window_minutes < MINUTES_PER_HOUR {
            warn!(
                window_minutes = self.window_minutes,
                minimum = MINUTES_PER_HOUR,
                "window shorter than one hour; raising to the minimum"
            );
            self.window_minutes = MINUTES_PER_HOUR;
        }
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://fapi.binance.com".to_string(),
            window_minutes: 60,
            hour_history_limit: 24,
            breakout_hours: 11,
            surge_multiplier: 5.0,
            rate_limit_per_minute: 800,
            fetch_concurrency: 12,
            request_timeout: Duration::from_secs(10),
            rate_limit_backoff: Duration::from_secs(5),
            stable_marker: "USDC".to_string(),
            tick_offset_ms: 1_000,
            alert_history_limit: 1_000,
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
