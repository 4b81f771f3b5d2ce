use std::collections::BTreeMap;

use tracing::{debug, error};

use crate::market::types::Candle;
use crate::time::MINUTE_MS;

/// Bounded sliding window of per-minute candle batches.
///
/// Keyed by minute-start timestamp; holds at most `window` minutes and evicts
/// the oldest on overflow. Single-writer: only the tick scheduler mutates it,
/// aggregators read immutable snapshots via `recent`.
///
/// Invariants (checked by `check_consistency`):
/// - sorted keys form a contiguous 60_000 ms arithmetic sequence
/// - every candle stored under key K has `open_time == K`
pub struct CandleStore {
    window: usize,
    minutes: BTreeMap<i64, Vec<Candle>>,
}

impl CandleStore {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            minutes: BTreeMap::new(),
        }
    }

    /// Inserts one minute's candles, keyed by their open time.
    ///
    /// A minute that already exists is a logged no-op (returns false). Candles
    /// are sorted by symbol for deterministic downstream iteration. Exceeding
    /// the window evicts the oldest minute.
    pub fn insert(&mut self, mut candles: Vec<Candle>) -> bool {
        let Some(first) = candles.first() else {
            debug!("empty minute batch; nothing to insert");
            return false;
        };
        let key = first.open_time;

        if self.minutes.contains_key(&key) {
            debug!(minute = key, "minute already stored; skipping");
            return false;
        }

        candles.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        self.minutes.insert(key, candles);

        while self.minutes.len() > self.window {
            if let Some((evicted, _)) = self.minutes.pop_first() {
                debug!(minute = evicted, "evicted oldest minute");
            }
        }

        true
    }

    /// Bulk insertion for backfill; batches must be chronological (oldest
    /// first), same semantics as repeated `insert`. Returns how many minutes
    /// were actually inserted.
    pub fn insert_batches(&mut self, batches: Vec<Vec<Candle>>) -> usize {
        let mut inserted = 0;
        for batch in batches {
            if self.insert(batch) {
                inserted += 1;
            }
        }
        inserted
    }

    /// The `n` most recent minutes in chronological order (fewer if the store
    /// holds less). `n == 0` yields an empty result.
    pub fn recent(&self, n: usize) -> Vec<(i64, &[Candle])> {
        if n == 0 {
            return Vec::new();
        }
        let skip = self.minutes.len().saturating_sub(n);
        self.minutes
            .iter()
            .skip(skip)
            .map(|(key, candles)| (*key, candles.as_slice()))
            .collect()
    }

    pub fn last_minute(&self) -> Option<i64> {
        self.minutes.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.minutes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.minutes.is_empty()
    }

    /// True iff the stored keys are gap-free at 60_000 ms steps and every
    /// candle sits under its own open time. True on an empty store.
    ///
    /// This is the hard precondition gate for aggregation: a false return
    /// aborts the current tick.
    pub fn check_consistency(&self) -> bool {
        let mut prev: Option<i64> = None;

        for (&key, candles) in &self.minutes {
            if let Some(prev_key) = prev {
                if key - prev_key != MINUTE_MS {
                    error!(
                        prev = prev_key,
                        next = key,
                        "candle store gap detected"
                    );
                    return false;
                }
            }
            if let Some(bad) = candles.iter().find(|c| c.open_time != key) {
                error!(
                    minute = key,
                    candle_open_time = bad.open_time,
                    symbol = %bad.symbol,
                    "candle filed under wrong minute"
                );
                return false;
            }
            prev = Some(key);
        }

        true
    }
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    fn minute_batch(open_time: i64) -> Vec<Candle> {
        vec![Candle {
            symbol: "AAA".to_string(),
            open: 1.0,
            high: 1.5,
            low: 0.9,
            close: 1.2,
            volume: 10.0,
            quote_volume: 12.0,
            taker_buy_base_volume: 5.0,
            taker_buy_quote_volume: 6.0,
            trades: 7,
            open_time,
            close_time: open_time + MINUTE_MS - 1,
        }]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Contiguous inserts in any quantity keep the store bounded and
        /// consistent, with the newest minutes retained.
        #[test]
        fn contiguous_inserts_stay_bounded_and_consistent(
            window in 1usize..80,
            count in 0usize..200,
        ) {
            let base = 1_755_000_000_000i64;
            let mut store = CandleStore::new(window);

            for i in 0..count {
                store.insert(minute_batch(base + i as i64 * MINUTE_MS));
            }

            prop_assert!(store.len() <= window);
            prop_assert_eq!(store.len(), count.min(window));
            prop_assert!(store.check_consistency());

            if count > 0 {
                let expected_last = base + (count as i64 - 1) * MINUTE_MS;
                prop_assert_eq!(store.last_minute(), Some(expected_last));
            }
        }

        /// Inserting arbitrary (possibly duplicate) minute offsets never
        /// exceeds the bound, and consistency agrees with a manual
        /// contiguity check of the retained keys.
        #[test]
        fn consistency_matches_manual_contiguity(
            offsets in prop::collection::vec(0i64..50, 1..60),
        ) {
            let base = 1_755_000_000_000i64;
            let mut store = CandleStore::new(16);

            for off in &offsets {
                store.insert(minute_batch(base + off * MINUTE_MS));
            }

            prop_assert!(store.len() <= 16);

            let keys: Vec<i64> = store.recent(usize::MAX).iter().map(|(k, _)| *k).collect();
            let contiguous = keys.windows(2).all(|w| w[1] - w[0] == MINUTE_MS);
            prop_assert_eq!(store.check_consistency(), contiguous);
        }
    }
}
