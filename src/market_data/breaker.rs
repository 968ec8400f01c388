//! Circuit breaker guarding exchange requests
//!
//! After `failure_threshold` consecutive failures the breaker opens and
//! requests are skipped until `cooldown` has elapsed. The first request after
//! the cooldown is a probe: success closes the breaker, failure reopens it.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
pub struct FetchBreaker {
    state: BreakerState,
    failures: u32,
    failure_threshold: u32,
    cooldown: Duration,
    opened_at: Option<Instant>,
}

impl FetchBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            failure_threshold: failure_threshold.max(1),
            cooldown,
            opened_at: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Whether a request may go out now
    pub fn can_attempt(&mut self) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let cooled = self
                    .opened_at
                    .map_or(true, |t| t.elapsed() >= self.cooldown);
                if cooled {
                    tracing::info!("Exchange breaker half-open, probing");
                    self.state = BreakerState::HalfOpen;
                }
                cooled
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state != BreakerState::Closed {
            tracing::info!("Exchange breaker closed");
        }
        self.state = BreakerState::Closed;
        self.failures = 0;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;

        let trip = match self.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => self.failures >= self.failure_threshold,
            BreakerState::Open => false,
        };

        if trip {
            tracing::warn!(
                "Exchange breaker opened after {} failures, cooling down {:?}",
                self.failures,
                self.cooldown
            );
            self.state = BreakerState::Open;
            self.opened_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_threshold() {
        let mut b = FetchBreaker::new(3, Duration::from_secs(60));
        b.record_failure();
        b.record_failure();
        assert!(b.can_attempt());
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.can_attempt());
    }

    #[test]
    fn test_success_resets_count() {
        let mut b = FetchBreaker::new(2, Duration::from_secs(60));
        b.record_failure();
        b.record_success();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_after_cooldown() {
        let mut b = FetchBreaker::new(1, Duration::from_secs(30));
        b.record_failure();
        assert!(!b.can_attempt());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(b.can_attempt());
        assert_eq!(b.state(), BreakerState::HalfOpen);

        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.can_attempt());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(b.can_attempt());
        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
    }
}
