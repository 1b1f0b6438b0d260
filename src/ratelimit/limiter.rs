//! Fixed-window rate limiter backed by a shared counter store.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::descriptor::RequestDescriptor;
use super::rules::{RateLimitRule, RuleSet};
use super::store::CounterStore;
use super::window::CounterKey;
use crate::error::{QuotagateError, Result};

/// Decides whether requests exceed their configured rate.
///
/// Holds no counter state of its own: every count lives in the store, so any
/// number of instances pointed at the same store share their budgets.
pub struct FixedWindowLimiter {
    rules: Arc<RuleSet>,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl FixedWindowLimiter {
    /// Create a limiter that reads the system clock.
    pub fn new(rules: Arc<RuleSet>, store: Arc<dyn CounterStore>) -> Self {
        Self::with_clock(rules, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        rules: Arc<RuleSet>,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rules,
            store,
            clock,
        }
    }

    /// Check a batch of descriptors. Returns `true` if any of them is over
    /// its limit.
    ///
    /// Duplicate descriptors are evaluated once. Evaluation stops at the
    /// first rejected descriptor, so later descriptors are not counted.
    pub async fn should_limit(&self, descriptors: &[RequestDescriptor]) -> Result<bool> {
        let mut seen: Vec<&RequestDescriptor> = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if seen.contains(&descriptor) {
                continue;
            }
            seen.push(descriptor);

            if self.check(descriptor).await? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Check a single descriptor against the rule that applies to it.
    ///
    /// Descriptors without a matching rule are always admitted.
    pub async fn check(&self, descriptor: &RequestDescriptor) -> Result<bool> {
        match self.rules.find_rule(descriptor) {
            Some(rule) => self.evaluate(descriptor, rule).await,
            None => {
                trace!(descriptor = %descriptor, "No rate limit rule matches");
                Ok(false)
            }
        }
    }

    /// Count a request against `rule` in the current window.
    ///
    /// Returns `true` when the window's allowance is already used up; the
    /// counter is left unchanged in that case. The read and the increment
    /// are separate store calls, so concurrent callers can push a counter
    /// slightly past the allowance.
    ///
    /// If a counter expires between the existence check and the increment,
    /// the store recreates it without an expiry. Window labels carry no date,
    /// so such a key is reused by the same hour (or minute) on later days
    /// until it is deleted by hand.
    pub async fn evaluate(&self, descriptor: &RequestDescriptor, rule: &RateLimitRule) -> Result<bool> {
        let key = CounterKey::new(descriptor, rule, self.clock.now());

        trace!(
            key = %key,
            allowed = rule.allowed_number_of_requests,
            interval = ?rule.time_interval,
            "Checking rate limit"
        );

        let current = self.store.get(key.as_str()).await.map_err(|e| {
            warn!(key = %key, error = %e, "Failed to read counter");
            e
        })?;

        if let Some(raw) = current {
            let count: u64 = raw.parse().map_err(|_| QuotagateError::MalformedCounterValue {
                key: key.to_string(),
                value: raw.clone(),
            })?;

            if count >= rule.allowed_number_of_requests {
                debug!(
                    key = %key,
                    count = count,
                    allowed = rule.allowed_number_of_requests,
                    "Rate limit exceeded"
                );
                return Ok(true);
            }
        }

        self.increment(&key, rule).await.map_err(|e| {
            warn!(key = %key, error = %e, "Failed to update counter");
            e
        })?;

        Ok(false)
    }

    async fn increment(&self, key: &CounterKey, rule: &RateLimitRule) -> Result<()> {
        if self.store.exists(key.as_str()).await? {
            let count = self.store.incr(key.as_str()).await?;
            trace!(key = %key, count = count, "Incremented counter");
        } else {
            let ttl = rule.time_interval.duration();
            self.store.set_ex(key.as_str(), 1, ttl).await?;
            trace!(key = %key, ttl_secs = ttl.as_secs(), "Opened new window");
        }
        Ok(())
    }
}

#[async_trait]
impl RateLimiterBackend for FixedWindowLimiter {
    async fn should_limit(&self, descriptors: &[RequestDescriptor]) -> Result<bool> {
        FixedWindowLimiter::should_limit(self, descriptors).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::store::MemoryStore;
    use crate::ratelimit::window::TimeInterval;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;

    struct Fixture {
        limiter: FixedWindowLimiter,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 14, 25, 10).unwrap()
    }

    fn fixture(rules: Vec<RateLimitRule>) -> Fixture {
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let limiter = FixedWindowLimiter::with_clock(
            Arc::new(RuleSet::new(rules).unwrap()),
            store.clone(),
            clock.clone(),
        );
        Fixture {
            limiter,
            store,
            clock,
        }
    }

    fn acct(id: &str) -> RequestDescriptor {
        RequestDescriptor::new().with_account_id(id)
    }

    #[tokio::test]
    async fn test_admits_up_to_allowance_then_rejects() {
        let f = fixture(vec![
            RateLimitRule::new(3, TimeInterval::Minute).with_account_id("acct1"),
        ]);
        let descriptor = acct("acct1");

        for i in 1..=3 {
            assert!(
                !f.limiter.check(&descriptor).await.unwrap(),
                "Request {} should be admitted",
                i
            );
        }
        assert!(f.limiter.check(&descriptor).await.unwrap());
        assert!(f.limiter.check(&descriptor).await.unwrap());

        let key = "accountId:acct1:time:14:25";
        assert_eq!(f.store.get(key).await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_first_request_opens_window_with_ttl() {
        let f = fixture(vec![
            RateLimitRule::new(5, TimeInterval::Hour).with_request_type("BATCH"),
        ]);
        let descriptor = RequestDescriptor::new().with_request_type("BATCH");

        assert!(!f.limiter.check(&descriptor).await.unwrap());

        let key = "requestType:BATCH:time:14";
        assert_eq!(f.store.get(key).await.unwrap().as_deref(), Some("1"));
        assert_eq!(f.store.ttl(key), Some(Duration::from_secs(3600)));
    }

    #[tokio::test]
    async fn test_counter_resets_after_minute_boundary() {
        let f = fixture(vec![
            RateLimitRule::new(1, TimeInterval::Minute).with_account_id("acct1"),
        ]);
        let descriptor = acct("acct1");

        assert!(!f.limiter.check(&descriptor).await.unwrap());
        assert!(f.limiter.check(&descriptor).await.unwrap());

        f.clock.set(Utc.with_ymd_and_hms(2024, 3, 1, 14, 26, 0).unwrap());
        assert!(!f.limiter.check(&descriptor).await.unwrap());
        assert!(f.limiter.check(&descriptor).await.unwrap());
    }

    #[tokio::test]
    async fn test_hour_window_spans_minutes() {
        let f = fixture(vec![
            RateLimitRule::new(2, TimeInterval::Hour).with_account_id("acct1"),
        ]);
        let descriptor = acct("acct1");

        assert!(!f.limiter.check(&descriptor).await.unwrap());
        f.clock.advance(Duration::from_secs(20 * 60));
        assert!(!f.limiter.check(&descriptor).await.unwrap());
        f.clock.advance(Duration::from_secs(10 * 60));
        assert!(f.limiter.check(&descriptor).await.unwrap());

        f.clock.set(Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap());
        assert!(!f.limiter.check(&descriptor).await.unwrap());
    }

    #[tokio::test]
    async fn test_unconstrained_field_shares_counter() {
        let f = fixture(vec![
            RateLimitRule::new(2, TimeInterval::Minute).with_account_id("acct1"),
        ]);
        let a = RequestDescriptor::new()
            .with_account_id("acct1")
            .with_client_ip("1.1.1.1");
        let b = RequestDescriptor::new()
            .with_account_id("acct1")
            .with_client_ip("2.2.2.2");

        assert!(!f.limiter.should_limit(&[a.clone()]).await.unwrap());
        assert!(!f.limiter.should_limit(&[b]).await.unwrap());
        assert!(f.limiter.should_limit(&[a]).await.unwrap());

        assert_eq!(
            f.store.get("accountId:acct1:time:14:25").await.unwrap().as_deref(),
            Some("2")
        );
        assert_eq!(f.store.len(), 1);
    }

    #[tokio::test]
    async fn test_wildcard_predicate_counts_per_value() {
        let f = fixture(vec![
            RateLimitRule::new(1, TimeInterval::Minute).with_client_ip(""),
        ]);
        let a = RequestDescriptor::new().with_client_ip("1.1.1.1");
        let b = RequestDescriptor::new().with_client_ip("2.2.2.2");

        assert!(!f.limiter.check(&a).await.unwrap());
        assert!(!f.limiter.check(&b).await.unwrap());
        assert!(f.limiter.check(&a).await.unwrap());
        assert!(f.limiter.check(&b).await.unwrap());
        assert_eq!(f.store.len(), 2);
    }

    #[tokio::test]
    async fn test_no_rules_always_admits() {
        let f = fixture(vec![]);
        let descriptor = RequestDescriptor::new()
            .with_account_id("acct1")
            .with_client_ip("1.1.1.1")
            .with_request_type("GET");

        for _ in 0..100 {
            assert!(!f.limiter.should_limit(&[descriptor.clone()]).await.unwrap());
        }
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_descriptor_does_not_touch_store() {
        let f = fixture(vec![
            RateLimitRule::new(1, TimeInterval::Minute).with_account_id("acct1"),
        ]);
        f.store.set_available(false);

        assert!(!f.limiter.check(&acct("acct2")).await.unwrap());
        assert!(!f.limiter.check(&RequestDescriptor::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_should_limit_any_descriptor_rejects_batch() {
        let f = fixture(vec![
            RateLimitRule::new(1, TimeInterval::Minute).with_account_id("acct1"),
        ]);

        assert!(!f.limiter.should_limit(&[acct("acct1"), acct("other")]).await.unwrap());
        assert!(f.limiter.should_limit(&[acct("other"), acct("acct1")]).await.unwrap());
    }

    #[tokio::test]
    async fn test_should_limit_stops_at_first_rejection() {
        let f = fixture(vec![
            RateLimitRule::new(1, TimeInterval::Minute).with_account_id(""),
        ]);

        assert!(!f.limiter.should_limit(&[acct("a")]).await.unwrap());
        assert!(f.limiter.should_limit(&[acct("a"), acct("b")]).await.unwrap());

        assert_eq!(f.store.get("accountId:b:time:14:25").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_should_limit_collapses_duplicates() {
        let f = fixture(vec![
            RateLimitRule::new(1, TimeInterval::Minute).with_account_id("acct1"),
        ]);

        assert!(!f
            .limiter
            .should_limit(&[acct("acct1"), acct("acct1")])
            .await
            .unwrap());
        assert_eq!(
            f.store.get("accountId:acct1:time:14:25").await.unwrap().as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn test_store_unavailable_surfaces() {
        let f = fixture(vec![
            RateLimitRule::new(1, TimeInterval::Minute).with_account_id("acct1"),
        ]);
        f.store.set_available(false);

        let result = f.limiter.should_limit(&[acct("other"), acct("acct1")]).await;
        assert!(matches!(result, Err(QuotagateError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_malformed_counter_surfaces() {
        let f = fixture(vec![
            RateLimitRule::new(5, TimeInterval::Minute).with_account_id("acct1"),
        ]);
        f.store.insert_raw("accountId:acct1:time:14:25", "lots");

        let result = f.limiter.check(&acct("acct1")).await;
        match result {
            Err(QuotagateError::MalformedCounterValue { key, value }) => {
                assert_eq!(key, "accountId:acct1:time:14:25");
                assert_eq!(value, "lots");
            }
            other => panic!("expected malformed counter error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_evaluate_with_explicit_rule() {
        let f = fixture(vec![]);
        let rule = RateLimitRule::new(1, TimeInterval::Minute);
        let descriptor = RequestDescriptor::new().with_client_ip("10.0.0.1");

        assert!(!f.limiter.evaluate(&descriptor, &rule).await.unwrap());
        assert!(f.limiter.evaluate(&descriptor, &rule).await.unwrap());
    }
}
