//! Adaptive per-domain rate limiter.
//!
//! Tracks request timing per domain and adapts delays based on responses.
//! Backs off on 429/503, gradually recovers on success, and honors
//! remaining-quota headers when the remote exposes them.

mod config;
mod domain_state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

pub use config::{DomainStats, RateLimitConfig};
use domain_state::DomainState;

/// Remaining-quota signals read from `x-ratelimit-*` response headers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaSignals {
    /// Requests left in the current window.
    pub remaining: f64,
    /// Seconds until the window resets.
    pub reset_secs: f64,
}

impl QuotaSignals {
    /// Read the signals from lower-cased response headers, if both are present.
    pub fn from_headers(headers: &HashMap<String, String>) -> Option<Self> {
        let remaining: f64 = headers.get("x-ratelimit-remaining")?.trim().parse().ok()?;
        let reset_secs: f64 = headers.get("x-ratelimit-reset")?.trim().parse().ok()?;
        if !remaining.is_finite() || !reset_secs.is_finite() {
            return None;
        }
        Some(Self {
            remaining,
            reset_secs,
        })
    }
}

/// Seconds to a `Duration`, saturating instead of panicking on huge values.
fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

/// How long to wait before the next call given the remote's quota.
///
/// Exhausted quota waits out the whole window; a nearly exhausted one
/// spreads the remaining requests over it.
pub fn quota_delay(min_delay: Duration, signals: Option<QuotaSignals>) -> Duration {
    let Some(QuotaSignals {
        remaining,
        reset_secs,
    }) = signals
    else {
        return min_delay;
    };
    if remaining <= 1.0 {
        saturating_secs(reset_secs)
    } else if remaining < 5.0 {
        saturating_secs(reset_secs / remaining)
    } else {
        min_delay
    }
}

/// Adaptive rate limiter that tracks per-domain request timing.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with default config.
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Create a new rate limiter with custom config.
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Extract the rate-limit key (lower-cased host) from a URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_lowercase()))
    }

    /// Wait until the domain is ready, then mark request as started.
    ///
    /// The slot is reserved under the write lock before sleeping, so
    /// concurrent callers for one domain queue up one delay apart.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let domain = Self::extract_domain(url)?;

        let wait_time = {
            let mut domains = self.domains.write().await;
            let state = domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(self.config.base_delay_for(&domain)));
            let wait = state.time_until_ready();
            state.last_request = Some(Instant::now() + wait);
            state.quota_wait = None;
            state.total_requests += 1;
            wait
        };

        if wait_time > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", domain, wait_time);
            tokio::time::sleep(wait_time).await;
        }

        Some(domain)
    }

    /// Report a successful request - may decrease delay.
    pub async fn report_success(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.consecutive_successes += 1;

            if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
                let new_delay = Duration::from_secs_f64(
                    state.current_delay.as_secs_f64() * self.config.recovery_multiplier,
                );
                state.current_delay = new_delay.max(self.config.min_delay);

                if state.current_delay <= state.base_delay {
                    state.in_backoff = false;
                    state.current_delay = state.base_delay;
                    info!("Domain {} recovered from rate limit backoff", domain);
                } else {
                    debug!(
                        "Domain {} delay reduced to {:?}",
                        domain, state.current_delay
                    );
                }

                state.consecutive_successes = 0;
            }
        }
    }

    /// Check if a status code is a rate limit signal.
    pub fn is_rate_limit(status_code: u16) -> bool {
        matches!(status_code, 429 | 503)
    }

    /// Report a rate limit hit (429 or 503) - increases delay.
    pub async fn report_rate_limit(&self, domain: &str, status_code: u16) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.rate_limit_hits += 1;
            state.consecutive_successes = 0;
            state.in_backoff = true;

            // A zero base delay would never grow under multiplication.
            let current = state.current_delay.max(Duration::from_secs(1));
            let new_delay =
                Duration::from_secs_f64(current.as_secs_f64() * self.config.backoff_multiplier);
            state.current_delay = new_delay.min(self.config.max_delay);

            warn!(
                "Rate limited by {} (HTTP {}), backing off to {:?}",
                domain, status_code, state.current_delay
            );
        }
    }

    /// Report a server error (5xx other than 503) - mild backoff.
    pub async fn report_server_error(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            let new_delay = Duration::from_secs_f64(state.current_delay.as_secs_f64() * 1.5);
            state.current_delay = new_delay.min(self.config.max_delay);
            debug!(
                "Server error for {}, delay increased to {:?}",
                domain, state.current_delay
            );
        }
    }

    /// Apply the remote's remaining-quota signals to the next request.
    pub async fn report_quota(&self, domain: &str, signals: QuotaSignals) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            let wait = quota_delay(state.current_delay, Some(signals)).min(self.config.max_delay);
            if signals.remaining <= 1.0 {
                warn!(
                    "Quota exhausted for {} ({} left), waiting {:?}",
                    domain, signals.remaining, wait
                );
            } else if signals.remaining < 5.0 {
                info!(
                    "Quota low for {} ({} left, reset in {}s), waiting {:?}",
                    domain, signals.remaining, signals.reset_secs, wait
                );
            }
            state.quota_wait = Some(wait);
        }
    }

    /// Get time until domain is ready.
    pub async fn time_until_ready(&self, url: &str) -> Duration {
        let domain = match Self::extract_domain(url) {
            Some(d) => d,
            None => return Duration::ZERO,
        };

        let domains = self.domains.read().await;
        domains
            .get(&domain)
            .map(|s| s.time_until_ready())
            .unwrap_or(Duration::ZERO)
    }

    /// Get statistics for all domains.
    pub async fn get_stats(&self) -> HashMap<String, DomainStats> {
        let domains = self.domains.read().await;
        domains
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    DomainStats {
                        current_delay: v.current_delay,
                        in_backoff: v.in_backoff,
                        total_requests: v.total_requests,
                        rate_limit_hits: v.rate_limit_hits,
                    },
                )
            })
            .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
