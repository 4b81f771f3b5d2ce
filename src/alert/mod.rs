use std::collections::VecDeque;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::time::utc_day;

#[derive(Clone, Debug, Serialize)]
pub enum SignalKind {
    /// Close broke the rolling maximum high by `excess`.
    Breakout { excess: f64 },
    /// Projected next-hour volume cleared the whole baseline; `confidence`
    /// is the tightest ratio that passed.
    VolumeSurge { confidence: f64 },
}

impl SignalKind {
    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::Breakout { .. } => "breakout",
            SignalKind::VolumeSurge { .. } => "volume-surge",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Alert {
    pub id: Uuid,
    pub symbol: String,
    pub kind: SignalKind,
    pub ts_ms: i64,
}

impl Alert {
    pub fn new(symbol: impl Into<String>, kind: SignalKind, ts_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            kind,
            ts_ms,
        }
    }
}

/// Downstream consumer of emitted alerts. Owns notification and persistence;
/// the pipeline only guarantees per-day deduplication before calling it.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn emit(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Default sink: structured log line per alert.
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn emit(&self, alert: &Alert) -> anyhow::Result<()> {
        info!(
            target: "alerts",
            alert_id = %alert.id,
            symbol = %alert.symbol,
            kind = alert.kind.name(),
            ts_ms = alert.ts_ms,
            payload = %serde_json::to_string(alert)?,
            "alert emitted"
        );
        Ok(())
    }
}

/// Bounded in-memory record of emitted alerts.
///
/// Gate for emission: a symbol that already alerted within the same UTC day
/// is suppressed, whatever the signal kind.
pub struct AlertHistory {
    limit: usize,
    alerts: VecDeque<Alert>,
}

impl AlertHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            alerts: VecDeque::new(),
        }
    }

    /// Records the alert unless its symbol already alerted today (UTC).
    /// Returns whether the alert should be emitted.
    pub fn record(&mut self, alert: Alert) -> bool {
        let day = utc_day(alert.ts_ms);

        let duplicate = self
            .alerts
            .iter()
            .any(|a| a.symbol == alert.symbol && utc_day(a.ts_ms) == day);
        if duplicate {
            warn!(symbol = %alert.symbol, "symbol already alerted today; suppressed");
            return false;
        }

        self.alerts.push_back(alert);
        while self.alerts.len() > self.limit {
            self.alerts.pop_front();
        }
        true
    }

    /// Drops alerts older than `cutoff_ms`.
    pub fn purge_older_than(&mut self, cutoff_ms: i64) {
        while let Some(front) = self.alerts.front() {
            if front.ts_ms < cutoff_ms {
                self.alerts.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Alert> {
        let skip = self.alerts.len().saturating_sub(n);
        self.alerts.iter().skip(skip)
    }
}
