//! Wall-clock aligned windows and counter key construction.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::descriptor::RequestDescriptor;
use super::rules::RateLimitRule;

const DELIMITER: &str = ":";
const TIME_LABEL: &str = "time";

/// Length of a rate limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInterval {
    /// Windows start at second :00 of every wall-clock minute
    Minute,
    /// Windows start at the top of every wall-clock hour
    Hour,
}

impl TimeInterval {
    /// Get the duration of this window, used as the counter TTL.
    pub fn duration(&self) -> Duration {
        match self {
            TimeInterval::Minute => Duration::from_secs(60),
            TimeInterval::Hour => Duration::from_secs(3600),
        }
    }

    /// The label identifying the window that contains `now`.
    ///
    /// `time:<hour>` for hourly windows, `time:<hour>:<minute>` otherwise.
    pub fn bucket_label(&self, now: DateTime<Utc>) -> String {
        match self {
            TimeInterval::Hour => format!("{}{}{}", TIME_LABEL, DELIMITER, now.hour()),
            TimeInterval::Minute => format!(
                "{}{}{}{}{}",
                TIME_LABEL,
                DELIMITER,
                now.hour(),
                DELIMITER,
                now.minute()
            ),
        }
    }
}

/// Address of a shared counter in the store.
///
/// Built from the descriptor's present fields (account, client IP, request
/// type, in that order) that the matched rule constrains, followed by the
/// window label of the rule's interval. Fields the rule ignores never
/// contribute, so an account-only rule keeps one counter per account no
/// matter which client IPs the account calls from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey(String);

impl CounterKey {
    pub fn new(descriptor: &RequestDescriptor, rule: &RateLimitRule, now: DateTime<Utc>) -> Self {
        let mut key = String::new();
        let fields = descriptor
            .present_fields()
            .filter(|(field, _)| rule.predicate(*field).is_some());
        for (field, value) in fields {
            key.push_str(field.label());
            key.push_str(DELIMITER);
            key.push_str(value);
            key.push_str(DELIMITER);
        }
        key.push_str(&rule.time_interval.bucket_label(now));
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
