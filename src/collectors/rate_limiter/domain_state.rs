//! Per-domain rate limiting state.

use std::time::{Duration, Instant};

/// State for a single domain.
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Delay this domain returns to after recovering.
    pub base_delay: Duration,
    /// Current delay for this domain.
    pub current_delay: Duration,
    /// One-off wait requested by the remote's quota headers.
    pub quota_wait: Option<Duration>,
    /// Last request time.
    pub last_request: Option<Instant>,
    /// Consecutive successes since last rate limit.
    pub consecutive_successes: u32,
    /// Whether currently in backoff.
    pub in_backoff: bool,
    /// Total requests made.
    pub total_requests: u64,
    /// Total rate limit hits.
    pub rate_limit_hits: u64,
}

impl DomainState {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            current_delay: base_delay,
            quota_wait: None,
            last_request: None,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    /// Delay that applies to the next request.
    pub fn effective_delay(&self) -> Duration {
        match self.quota_wait {
            Some(wait) => wait.max(self.current_delay),
            None => self.current_delay,
        }
    }

    /// Time until this domain is ready for another request.
    ///
    /// `last_request` may lie in the future when a slot has been reserved.
    pub fn time_until_ready(&self) -> Duration {
        match self.last_request {
            Some(last) => last
                .checked_add(self.effective_delay())
                .map(|ready| ready.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::MAX),
            None => Duration::ZERO,
        }
    }

    /// Check if this domain is ready for a request now.
    pub fn is_ready(&self) -> bool {
        self.time_until_ready() == Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_domain_is_ready() {
        let state = DomainState::new(Duration::from_secs(5));
        assert!(state.is_ready());
    }

    #[test]
    fn test_quota_wait_extends_delay() {
        let mut state = DomainState::new(Duration::from_millis(100));
        state.quota_wait = Some(Duration::from_secs(30));
        state.last_request = Some(Instant::now());

        assert_eq!(state.effective_delay(), Duration::from_secs(30));
        assert!(state.time_until_ready() > Duration::from_secs(29));
    }

    #[test]
    fn test_reserved_slot_counts_from_future_start() {
        let mut state = DomainState::new(Duration::from_secs(2));
        state.last_request = Some(Instant::now() + Duration::from_secs(2));

        let wait = state.time_until_ready();
        assert!(wait > Duration::from_secs(3));
        assert!(wait <= Duration::from_secs(4));
    }
}
