//! Rate limit rules configuration and matching.
//!
//! Rules are loaded once at startup from a YAML document and never mutated
//! afterwards. Each rule carries up to three field predicates; a descriptor
//! is matched against them independently per field.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::descriptor::{DescriptorField, RequestDescriptor};
use super::window::TimeInterval;
use crate::error::{QuotagateError, Result};

/// A single configured rate limit.
///
/// For each predicate, `None` means "don't care", `Some("")` means the
/// descriptor must supply some non-empty value, and any other value must be
/// matched exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RateLimitRule {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub request_type: Option<String>,
    /// Number of requests admitted per window
    pub allowed_number_of_requests: u64,
    /// Length and alignment of the window
    pub time_interval: TimeInterval,
}

impl RateLimitRule {
    /// Create a rule with no field predicates.
    pub fn new(allowed_number_of_requests: u64, time_interval: TimeInterval) -> Self {
        Self {
            account_id: None,
            client_ip: None,
            request_type: None,
            allowed_number_of_requests,
            time_interval,
        }
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    pub fn with_request_type(mut self, request_type: impl Into<String>) -> Self {
        self.request_type = Some(request_type.into());
        self
    }

    /// The predicate this rule places on a field.
    pub fn predicate(&self, field: DescriptorField) -> Option<&str> {
        match field {
            DescriptorField::AccountId => self.account_id.as_deref(),
            DescriptorField::ClientIp => self.client_ip.as_deref(),
            DescriptorField::RequestType => self.request_type.as_deref(),
        }
    }

    /// Whether every field predicate of this rule accepts the descriptor.
    pub fn matches(&self, descriptor: &RequestDescriptor) -> bool {
        DescriptorField::ALL.iter().all(|&field| {
            match (self.predicate(field), descriptor.present(field)) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(""), Some(_)) => true,
                (Some(expected), Some(actual)) => expected == actual,
            }
        })
    }
}

fn parse_error(e: serde_yaml::Error) -> QuotagateError {
    QuotagateError::Config(format!("Failed to parse rate limit rules: {}", e))
}

/// The immutable collection of configured rules.
///
/// Rules are kept in load order and [`RuleSet::find_rule`] returns the first
/// match. Which of several overlapping rules wins is not part of the
/// contract; the order only makes the choice reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    #[serde(default)]
    rules: Vec<RateLimitRule>,
}

impl RuleSet {
    /// Create a rule set, rejecting rules that could never admit a request.
    pub fn new(rules: Vec<RateLimitRule>) -> Result<Self> {
        let set = Self { rules };
        set.validate()?;
        Ok(set)
    }

    /// Create an empty rule set. Nothing is ever limited.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    ///
    /// Accepts either a `rules:` mapping or a bare list of rules.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let document: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(parse_error)?;

        let set = if document.is_sequence() {
            let rules: Vec<RateLimitRule> =
                serde_yaml::from_value(document).map_err(parse_error)?;
            RuleSet { rules }
        } else {
            serde_yaml::from_value(document).map_err(parse_error)?
        };
        set.validate()?;
        Ok(set)
    }

    fn validate(&self) -> Result<()> {
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.allowed_number_of_requests == 0 {
                return Err(QuotagateError::Config(format!(
                    "rule #{} must allow at least one request per window",
                    index
                )));
            }
        }
        Ok(())
    }

    /// Find the rule that applies to a descriptor, if any.
    pub fn find_rule(&self, descriptor: &RequestDescriptor) -> Option<&RateLimitRule> {
        self.rules.iter().find(|rule| rule.matches(descriptor))
    }

    pub fn rules(&self) -> &[RateLimitRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
