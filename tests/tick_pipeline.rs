//! End-to-end pipeline test against a synthetic exchange: backfill,
//! steady-state tick, and alert flow through the public API only.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use candlewatch::alert::{Alert, AlertSink, SignalKind};
use candlewatch::config::AppConfig;
use candlewatch::market::client::KlineSource;
use candlewatch::market::errors::FetchError;
use candlewatch::market::types::Candle;
use candlewatch::scheduler::tick::TickScheduler;
use candlewatch::time::{MINUTE_MS, now_ms};

/// Serves deterministic candles keyed off wall-clock minute indices. One
/// symbol can be marked as permanently failing to exercise partial batches.
struct SyntheticExchange {
    symbols: Vec<String>,
    failing: Option<String>,
}

impl SyntheticExchange {
    fn new(symbols: &[&str], failing: Option<&str>) -> Self {
        Self {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            failing: failing.map(|s| s.to_string()),
        }
    }

    fn candle(symbol: &str, open_time: i64) -> Candle {
        let price = (open_time / MINUTE_MS % 100_000) as f64;
        Candle {
            symbol: symbol.to_string(),
            open: price - 0.3,
            high: price,
            low: price - 0.6,
            close: price,
            volume: 4.0,
            quote_volume: 8.0,
            taker_buy_base_volume: 2.0,
            taker_buy_quote_volume: 4.0,
            trades: 11,
            open_time,
            close_time: open_time + MINUTE_MS - 1,
        }
    }
}

#[async_trait]
impl KlineSource for SyntheticExchange {
    async fn fetch_klines(
        &self,
        symbol: &str,
        limit: usize,
        end_time_ms: i64,
    ) -> Result<Vec<Candle>, FetchError> {
        if self.failing.as_deref() == Some(symbol) {
            return Err(FetchError::Malformed("synthetic outage".to_string()));
        }
        let end_minute = end_time_ms + 1 - MINUTE_MS;
        let start = end_minute - (limit as i64 - 1) * MINUTE_MS;
        Ok((0..limit)
            .map(|i| Self::candle(symbol, start + i as i64 * MINUTE_MS))
            .collect())
    }

    async fn trading_symbols(&self) -> Result<Vec<String>, FetchError> {
        Ok(self.symbols.clone())
    }
}

#[derive(Clone, Default)]
struct CollectingSink(Arc<Mutex<Vec<Alert>>>);

#[async_trait]
impl AlertSink for CollectingSink {
    async fn emit(&self, alert: &Alert) -> anyhow::Result<()> {
        self.0.lock().push(alert.clone());
        Ok(())
    }
}

fn test_config(window: usize) -> AppConfig {
    AppConfig {
        window_minutes: window,
        rate_limit_per_minute: 10_000,
        fetch_concurrency: 8,
        rate_limit_backoff: Duration::from_millis(1),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn backfill_then_tick_keeps_the_window_full_and_consistent() {
    let exchange = SyntheticExchange::new(&["BTCUSDT", "ETHUSDT", "SOLUSDT"], Some("SOLUSDT"));
    let sink = CollectingSink::default();
    let mut scheduler = TickScheduler::new(Arc::new(exchange), sink, test_config(20));

    scheduler.backfill().await.expect("backfill succeeds");

    assert_eq!(scheduler.store().len(), 20);
    assert!(scheduler.store().check_consistency());
    // The failing symbol is dropped from every batch, never ragged.
    for (_, batch) in scheduler.store().recent(20) {
        assert_eq!(batch.len(), 2);
    }

    // A steady-state tick with no completed-hour history emits nothing but
    // must leave the window intact.
    scheduler.on_tick().await.expect("tick succeeds");

    assert_eq!(scheduler.store().len(), 20);
    assert!(scheduler.store().check_consistency());
    assert_eq!(
        scheduler.store().last_minute(),
        Some(candlewatch::time::last_closed_minute(now_ms()))
    );
    assert!(scheduler.alert_history().is_empty());
}

#[tokio::test]
async fn empty_universe_aborts_startup() {
    let exchange = SyntheticExchange::new(&[], None);
    let mut scheduler = TickScheduler::new(
        Arc::new(exchange),
        CollectingSink::default(),
        test_config(10),
    );

    assert!(scheduler.backfill().await.is_err());
}

#[tokio::test]
async fn sink_receives_serializable_alerts() {
    // Shape check on the alert payload the production sink would log.
    let alert = Alert::new("BTCUSDT", SignalKind::Breakout { excess: 1.25 }, now_ms());
    let payload = serde_json::to_value(&alert).expect("alert serializes");

    assert_eq!(payload["symbol"], "BTCUSDT");
    assert_eq!(payload["kind"]["Breakout"]["excess"], 1.25);
    assert_eq!(alert.kind.name(), "breakout");
}
