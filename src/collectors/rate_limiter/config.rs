//! Rate limiter configuration and statistics.

use std::collections::HashMap;
use std::time::Duration;

/// Tuning for the adaptive limiter.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Delay between requests to a domain with no override.
    pub base_delay: Duration,
    /// Floor the delay never recovers below.
    pub min_delay: Duration,
    /// Ceiling for backoff.
    pub max_delay: Duration,
    /// Factor applied to the delay on 429/503.
    pub backoff_multiplier: f64,
    /// Factor applied to the delay after a run of successes.
    pub recovery_multiplier: f64,
    /// Consecutive successes needed before recovering.
    pub recovery_threshold: u32,
    /// Per-domain base delays, matched on the domain and its subdomains.
    pub domain_delays: HashMap<String, Duration>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::ZERO,
            min_delay: Duration::ZERO,
            max_delay: Duration::from_secs(120),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.5,
            recovery_threshold: 5,
            domain_delays: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Set the base delay for a domain.
    pub fn with_domain_delay(mut self, domain: &str, delay: Duration) -> Self {
        self.domain_delays.insert(domain.to_lowercase(), delay);
        self
    }

    /// Base delay for a host, honoring the most specific override.
    pub fn base_delay_for(&self, host: &str) -> Duration {
        let mut candidate = host;
        loop {
            if let Some(delay) = self.domain_delays.get(candidate) {
                return *delay;
            }
            match candidate.split_once('.') {
                Some((_, parent)) if parent.contains('.') => candidate = parent,
                _ => return self.base_delay,
            }
        }
    }
}

/// Snapshot of one domain's limiter state.
#[derive(Debug, Clone)]
pub struct DomainStats {
    pub current_delay: Duration,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}
