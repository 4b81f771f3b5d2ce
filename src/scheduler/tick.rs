//! Tick scheduler for the candle pipeline.
//!
//! Responsibilities:
//! - Backfill the sliding window once at startup (BACKFILLING).
//! - Drive one pass per wall-clock minute (STEADY): fetch the missing
//!   minutes, update the store, run aggregation and breakout detection in a
//!   fixed order, emit deduplicated alerts.
//! - Catch up when a pass overruns a minute (CATCHING-UP): re-fetch whatever
//!   closed while the previous fetch was in flight, until no minutes are
//!   missing.
//!
//! Safety/liveness properties:
//! - At most one tick is in flight; aggregation runs synchronously on a
//!   snapshot taken after all fetches complete, so nothing mutates the
//!   window mid-computation.
//! - A consistency-check failure aborts the tick, never the process.
//! - Per-symbol fetch failures shrink the batch; they never propagate.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, error, info, instrument, warn};

use crate::alert::{Alert, AlertHistory, AlertSink, SignalKind};
use crate::analytics::breakout::{detect_breakouts, detect_volume_surges, latest_closes, rolling_max_highs};
use crate::analytics::hour::{HourAggregate, aggregate_period};
use crate::analytics::volume::{VOLUME_BASELINE_HOURS, VOLUME_WINDOW_MINUTES, volume_matrix, volumes_10m};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::logger::warn_if_slow;
use crate::market::client::KlineSource;
use crate::market::fetcher::ConcurrentFetcher;
use crate::market::rate_limiter::RateLimiter;
use crate::store::candles::CandleStore;
use crate::store::hours::HourHistory;
use crate::time::{
    DAY_MS, MINUTE_MS, MINUTES_PER_HOUR, floor_to_minute, last_closed_minute, minute_of_hour,
    now_ms,
};

pub struct TickScheduler<S, A> {
    source: Arc<S>,
    fetcher: ConcurrentFetcher<S>,
    sink: A,
    cfg: AppConfig,

    symbols: Vec<String>,
    store: CandleStore,
    hours: HourHistory,
    alerts: AlertHistory,
}

impl<S, A> TickScheduler<S, A>
where
    S: KlineSource + 'static,
    A: AlertSink,
{
    pub fn new(source: Arc<S>, sink: A, cfg: AppConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(cfg.rate_limit_per_minute));
        let fetcher = ConcurrentFetcher::new(
            Arc::clone(&source),
            limiter,
            cfg.fetch_concurrency,
            cfg.rate_limit_backoff,
        );

        Self {
            store: CandleStore::new(cfg.window_minutes),
            hours: HourHistory::new(cfg.hour_history_limit),
            alerts: AlertHistory::new(cfg.alert_history_limit),
            symbols: Vec::new(),
            source,
            fetcher,
            sink,
            cfg,
        }
    }

    /// Backfills the window, then ticks once per minute forever.
    pub async fn run(mut self) -> anyhow::Result<()> {
        self.backfill().await?;

        loop {
            self.sleep_until_next_tick().await;
            if let Err(e) = self.on_tick().await {
                error!(error = ?e, "tick aborted");
            }
        }
    }

    /// Initial bulk fetch of a full window of closed minutes. Fatal if the
    /// universe is empty or the window cannot be filled gap-free.
    pub async fn backfill(&mut self) -> anyhow::Result<()> {
        self.refresh_symbols(true).await?;

        let want = self.cfg.window_minutes;
        let end = last_closed_minute(now_ms());
        info!(
            minutes = want,
            symbols = self.symbols.len(),
            "starting backfill"
        );

        let batches = self.fetcher.fetch_window(&self.symbols, want, end).await;
        self.store.insert_batches(batches);

        if self.store.len() != want {
            return Err(AppError::BackfillIncomplete {
                got: self.store.len(),
                want,
            }
            .into());
        }
        if !self.store.check_consistency() {
            return Err(AppError::StoreInconsistent.into());
        }

        info!(minutes = want, "backfill complete");
        Ok(())
    }

    /// One steady-state pass: refresh the universe, fill missing minutes
    /// (catching up if the fetch itself overran a minute), gate on store
    /// consistency, then aggregate, detect and emit.
    #[instrument(skip(self), target = "scheduler")]
    pub async fn on_tick(&mut self) -> anyhow::Result<()> {
        self.refresh_symbols(false).await?;
        self.fill_missing_minutes().await?;

        if !self.store.check_consistency() {
            return Err(AppError::StoreInconsistent.into());
        }

        let now = now_ms();

        // Analytics only ever run over a window that is caught up with the
        // clock. A lagging window would yield stale closes and, at minute 0,
        // a "completed hour" keyed off a non-hour-aligned start.
        let target = last_closed_minute(now);
        if self.store.last_minute() != Some(target) {
            warn!(
                last_minute = ?self.store.last_minute(),
                target,
                "window is behind the clock; skipping analytics this tick"
            );
            return Ok(());
        }

        let alerts = self.run_analytics(now);

        for alert in alerts {
            if let Err(e) = self.sink.emit(&alert).await {
                warn!(error = ?e, alert_id = %alert.id, "alert sink failed");
            }
        }
        self.alerts.purge_older_than(now - DAY_MS);

        Ok(())
    }

    /// Fetches every closed minute the store does not yet hold. Loops because
    /// a slow fetch can itself span minute boundaries; terminates once the
    /// store has caught up or the fetch stops making progress.
    async fn fill_missing_minutes(&mut self) -> anyhow::Result<()> {
        loop {
            let target = last_closed_minute(now_ms());
            let last = self
                .store
                .last_minute()
                .context("candle store is empty after backfill")?;
            if last >= target {
                return Ok(());
            }

            // Never ask for more than the window: anything older is evicted
            // on arrival, and it keeps the request under the exchange's kline
            // limit after a long stall.
            let missing = (((target - last) / MINUTE_MS) as usize).min(self.cfg.window_minutes);
            if missing > 1 {
                info!(missing, "catching up on missed minutes");
            }

            let batches = warn_if_slow(
                "fetch_window",
                Duration::from_secs(45),
                self.fetcher.fetch_window(&self.symbols, missing, target),
            )
            .await;

            let inserted = self.store.insert_batches(batches);
            if inserted == 0 {
                warn!("no new minutes could be fetched; deferring to next tick");
                return Ok(());
            }
        }
    }

    /// Synchronous aggregation and detection over the post-fetch snapshot.
    /// Order is fixed: hour rollover, dynamic hour, rolling volumes, price
    /// breakout, volume surge. Returns the alerts that passed per-day
    /// deduplication.
    fn run_analytics(&mut self, now: i64) -> Vec<Alert> {
        let minute = minute_of_hour(now);

        // Completed hour rolls over at minute 0.
        if minute == 0 && self.store.len() >= MINUTES_PER_HOUR {
            let (hour_start, rows) = {
                let hour_minutes = self.store.recent(MINUTES_PER_HOUR);
                (hour_minutes[0].0, aggregate_period(&hour_minutes))
            };
            self.hours.push(hour_start, rows);
            debug!(hour_start, "completed hour recorded");
        }

        let elapsed = (minute as usize).max(1);

        // Dynamic partial hour over the minutes elapsed since the top of the
        // current hour (minimum 1: at minute 0 the newest closed minute).
        let dynamic = {
            let minutes = self.store.recent(elapsed);
            aggregate_period(&minutes)
        };

        // The partial-hour period contributing to the breakout level excludes
        // the newest minute: that candle's own high always bounds its close,
        // so including it would mask every breakout.
        let level_dynamic = {
            let mut minutes = self.store.recent(elapsed);
            minutes.pop();
            aggregate_period(&minutes)
        };

        let mut candidates: Vec<Alert> = Vec::new();

        let completed_hours = self.cfg.breakout_hours + usize::from(minute == 0);
        if self.hours.len() >= completed_hours {
            let mut periods = self.hours.recent(completed_hours);
            periods.push(level_dynamic.as_slice());
            let levels = rolling_max_highs(&periods);

            let recent = self.store.recent(1);
            let closes = match recent.first() {
                Some((_, newest)) => latest_closes(newest),
                None => Default::default(),
            };

            for b in detect_breakouts(&closes, &levels) {
                info!(
                    symbol = %b.symbol,
                    close = b.close,
                    level = b.level,
                    excess = b.excess,
                    "price breakout detected"
                );
                candidates.push(Alert::new(
                    b.symbol,
                    SignalKind::Breakout { excess: b.excess },
                    now,
                ));
            }
        } else {
            debug!(
                have = self.hours.len(),
                need = completed_hours,
                "breakout horizon incomplete; skipping"
            );
        }

        let recent = self.store.recent(VOLUME_WINDOW_MINUTES);
        if let Some(volumes) = volumes_10m(&recent) {
            let history = self.hours.recent(VOLUME_BASELINE_HOURS);
            if let Some(baseline) = volume_matrix(&history, &dynamic) {
                for s in detect_volume_surges(&volumes, &baseline, self.cfg.surge_multiplier) {
                    info!(
                        symbol = %s.symbol,
                        projected = s.projected,
                        confidence = s.confidence,
                        "volume surge detected"
                    );
                    candidates.push(Alert::new(
                        s.symbol,
                        SignalKind::VolumeSurge {
                            confidence: s.confidence,
                        },
                        now,
                    ));
                }
            }
        }

        candidates
            .into_iter()
            .filter(|alert| self.alerts.record(alert.clone()))
            .collect()
    }

    /// Re-queries the tradable universe. At startup an empty or failed result
    /// is fatal; mid-run the previous set is kept with a warning.
    async fn refresh_symbols(&mut self, startup: bool) -> anyhow::Result<()> {
        match self.source.trading_symbols().await {
            Ok(symbols) if !symbols.is_empty() => {
                if symbols.len() != self.symbols.len() {
                    info!(
                        previous = self.symbols.len(),
                        current = symbols.len(),
                        "symbol universe changed"
                    );
                }
                self.symbols = symbols;
                Ok(())
            }
            Ok(_) if startup => Err(AppError::EmptySymbolUniverse.into()),
            Ok(_) => {
                warn!("symbol universe refresh returned nothing; keeping previous set");
                Ok(())
            }
            Err(e) if startup => Err(anyhow::Error::new(e).context("fetching symbol universe")),
            Err(e) => {
                warn!(error = %e, "symbol universe refresh failed; keeping previous set");
                Ok(())
            }
        }
    }

    async fn sleep_until_next_tick(&self) {
        let now = now_ms();
        let next = floor_to_minute(now) + MINUTE_MS + self.cfg.tick_offset_ms;
        tokio::time::sleep(Duration::from_millis((next - now).max(0) as u64)).await;
    }

    /// Snapshot accessors. Safe to read between ticks only; the scheduler is
    /// the single writer.
    pub fn store(&self) -> &CandleStore {
        &self.store
    }

    pub fn hour_history(&self) -> &HourHistory {
        &self.hours
    }

    pub fn alert_history(&self) -> &AlertHistory {
        &self.alerts
    }

    /// Seeds completed-hour history, e.g. from a warm-up computation.
    pub fn push_hour(&mut self, hour_start: i64, rows: Vec<HourAggregate>) {
        self.hours.push(hour_start, rows);
    }
}
