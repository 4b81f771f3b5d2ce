use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::warn;

const WINDOW: Duration = Duration::from_secs(60);

/// Enforces a rolling 60-second cap on outbound API requests.
///
/// Every fetch worker calls `acquire()` before sending a request. The limiter
/// keeps a queue of request timestamps; once the queue is at capacity the
/// caller sleeps until the oldest entry falls out of the trailing window and
/// then re-checks. The lock is never held across the sleep, so any number of
/// workers can wait concurrently.
pub struct RateLimiter {
    budget: usize,
    stamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: usize) -> Self {
        Self {
            budget: requests_per_minute.max(1),
            stamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Suspends until one more request fits inside the trailing 60s window,
    /// then records it. Never fails.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut stamps = self.stamps.lock();
                let now = Instant::now();

                while let Some(front) = stamps.front() {
                    if now.duration_since(*front) >= WINDOW {
                        stamps.pop_front();
                    } else {
                        break;
                    }
                }

                if stamps.len() < self.budget {
                    stamps.push_back(now);
                    return;
                }

                match stamps.front().copied() {
                    Some(oldest) => WINDOW.saturating_sub(now.duration_since(oldest)),
                    None => Duration::ZERO,
                }
            };

            if !wait.is_zero() {
                warn!(
                    wait_ms = wait.as_millis() as u64,
                    budget = self.budget,
                    "request budget exhausted; waiting"
                );
            }
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests currently recorded inside the trailing window.
    pub fn recorded(&self) -> usize {
        let mut stamps = self.stamps.lock();
        let now = Instant::now();
        while let Some(front) = stamps.front() {
            if now.duration_since(*front) >= WINDOW {
                stamps.pop_front();
            } else {
                break;
            }
        }
        stamps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn under_budget_never_waits() {
        let limiter = RateLimiter::new(3);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.recorded(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn at_budget_waits_for_oldest_to_expire() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        // Third caller must wait the full window (paused clock auto-advances).
        limiter.acquire().await;

        assert!(start.elapsed() >= WINDOW);
        assert_eq!(limiter.recorded(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_frees_up_as_window_slides() {
        let limiter = RateLimiter::new(2);

        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.acquire().await;

        // 31s later the first stamp has expired; one slot is free again.
        tokio::time::advance(Duration::from_secs(31)).await;
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
