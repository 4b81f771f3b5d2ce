use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::analytics::hour::HourAggregate;

/// Bounded chronology of completed hourly aggregates.
///
/// One entry per completed hour, oldest first, deduplicated by hour start.
/// Single-writer like the candle store; readers get slices via `recent`.
pub struct HourHistory {
    limit: usize,
    hours: VecDeque<(i64, Vec<HourAggregate>)>,
}

impl HourHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            hours: VecDeque::new(),
        }
    }

    /// Records the aggregates for one completed hour.
    ///
    /// Re-pushing the newest hour replaces it (recomputation wins); an hour
    /// older than the newest stored one is rejected, since history only ever
    /// advances.
    pub fn push(&mut self, hour_start: i64, rows: Vec<HourAggregate>) {
        if let Some((newest, existing)) = self.hours.back_mut() {
            if *newest == hour_start {
                debug!(hour_start, "replacing aggregates for current hour");
                *existing = rows;
                return;
            }
            if *newest > hour_start {
                warn!(
                    hour_start,
                    newest, "out-of-order hour aggregate rejected"
                );
                return;
            }
        }

        self.hours.push_back((hour_start, rows));
        while self.hours.len() > self.limit {
            self.hours.pop_front();
        }
    }

    /// The `n` most recent completed hours in chronological order (fewer if
    /// the history is still warming up).
    pub fn recent(&self, n: usize) -> Vec<&[HourAggregate]> {
        let skip = self.hours.len().saturating_sub(n);
        self.hours
            .iter()
            .skip(skip)
            .map(|(_, rows)| rows.as_slice())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.hours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hours.is_empty()
    }

    pub fn last_hour_start(&self) -> Option<i64> {
        self.hours.back().map(|(hour_start, _)| *hour_start)
    }
}
