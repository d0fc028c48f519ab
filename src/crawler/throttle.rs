//! Adaptive request throttle
//!
//! Spaces requests to one server by a delay that follows observed latency:
//! the target delay is `latency / target_concurrency`, and the current delay
//! moves halfway towards it after each response. Failed responses may raise
//! the delay but never lower it. The delay stays within `[min, max]`.

use crate::config::ThrottleConfig;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct ThrottleState {
    delay: Duration,
    next_slot: Option<Instant>,
}

pub struct AdaptiveThrottle {
    state: Mutex<ThrottleState>,
    min_delay: Duration,
    max_delay: Duration,
    target_concurrency: f64,
}

impl AdaptiveThrottle {
    pub fn new(start: Duration, min: Duration, max: Duration, target_concurrency: f64) -> Self {
        let max = max.max(min);
        Self {
            state: Mutex::new(ThrottleState {
                delay: start.clamp(min, max),
                next_slot: None,
            }),
            min_delay: min,
            max_delay: max,
            target_concurrency: if target_concurrency > 0.0 {
                target_concurrency
            } else {
                1.0
            },
        }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(
            Duration::from_millis(config.start_delay_ms),
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.target_concurrency,
        )
    }

    /// Current delay between requests
    pub fn delay(&self) -> Duration {
        self.state
            .lock()
            .map(|s| s.delay)
            .unwrap_or(self.max_delay)
    }

    /// Wait for this request's slot
    pub async fn acquire(&self) {
        let slot = match self.state.lock() {
            Ok(mut state) => {
                let now = Instant::now();
                let slot = state.next_slot.map_or(now, |next| next.max(now));
                state.next_slot = Some(slot + state.delay);
                slot
            }
            Err(_) => return,
        };

        tokio::time::sleep_until(slot).await;
    }

    /// Adjust the delay after a response
    pub fn record(&self, latency: Duration, success: bool) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        let target = latency.div_f64(self.target_concurrency);
        let proposed = ((state.delay + target) / 2)
            .max(target)
            .clamp(self.min_delay, self.max_delay);

        if !success && proposed < state.delay {
            return;
        }

        if proposed != state.delay {
            tracing::debug!("Throttle delay {:?} -> {:?} (latency {:?})", state.delay, proposed, latency);
        }
        state.delay = proposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle() -> AdaptiveThrottle {
        AdaptiveThrottle::new(
            Duration::from_secs(2),
            Duration::from_millis(100),
            Duration::from_secs(60),
            2.0,
        )
    }

    #[test]
    fn test_fast_responses_relax_delay() {
        let throttle = throttle();
        throttle.record(Duration::from_millis(200), true);
        // halfway from 2s towards 100ms
        assert_eq!(throttle.delay(), Duration::from_millis(1050));
    }

    #[test]
    fn test_slow_responses_raise_delay() {
        let throttle = throttle();
        throttle.record(Duration::from_secs(10), true);
        assert_eq!(throttle.delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_failures_never_relax() {
        let throttle = throttle();
        throttle.record(Duration::from_millis(10), false);
        assert_eq!(throttle.delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_delay_bounded() {
        let throttle = throttle();
        for _ in 0..10 {
            throttle.record(Duration::from_secs(600), true);
        }
        assert_eq!(throttle.delay(), Duration::from_secs(60));

        for _ in 0..50 {
            throttle.record(Duration::ZERO, true);
        }
        assert_eq!(throttle.delay(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_requests_spaced_by_delay() {
        let throttle = AdaptiveThrottle::new(
            Duration::from_millis(50),
            Duration::ZERO,
            Duration::from_secs(60),
            2.0,
        );
        let started = Instant::now();

        throttle.acquire().await;
        throttle.acquire().await;
        throttle.acquire().await;

        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
