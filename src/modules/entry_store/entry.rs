//! Shared entries.

use crate::modules::access_control::RuleSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type served for files that do not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// What a granted request receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntryTarget {
    /// An uploaded file, relative to the upload directory.
    File {
        /// File name inside the upload directory.
        filename: String,
        /// Declared content type.
        #[serde(default)]
        content_type: Option<String>,
    },
    /// A temporary redirect.
    Redirect {
        /// Redirect location.
        url: String,
    },
    /// A reverse-proxied URL.
    Proxy {
        /// Upstream URL.
        url: String,
    },
}

impl EntryTarget {
    /// Content type for file targets, falling back to `text/plain`.
    #[must_use]
    pub fn content_type(&self) -> &str {
        match self {
            Self::File {
                content_type: Some(content_type),
                ..
            } if !content_type.is_empty() => content_type,
            _ => DEFAULT_CONTENT_TYPE,
        }
    }
}

/// A named, access-controlled resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Short name used in the request path.
    pub name: String,

    /// What is served on success.
    pub target: EntryTarget,

    /// Access rules.
    #[serde(default)]
    pub rules: RuleSet,

    /// Every request is denied and turned into new rules.
    #[serde(default)]
    pub training: bool,

    /// Granted requests.
    #[serde(default)]
    pub access_count: u64,

    /// Denied requests (rules or expiration).
    #[serde(default)]
    pub denied_count: u64,

    /// Expire after this many granted requests.
    #[serde(default)]
    pub access_limit: Option<u64>,

    /// Expire at this instant.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// Creation time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Entry {
    /// Create an entry with no rules.
    pub fn new(name: impl Into<String>, target: EntryTarget) -> Self {
        Self {
            name: name.into(),
            target,
            rules: RuleSet::new(),
            training: false,
            access_count: 0,
            denied_count: 0,
            access_limit: None,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    /// Set the rules.
    #[must_use]
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Enable or disable training.
    #[must_use]
    pub fn with_training(mut self, training: bool) -> Self {
        self.training = training;
        self
    }

    /// Expire after `limit` granted requests.
    #[must_use]
    pub fn with_access_limit(mut self, limit: u64) -> Self {
        self.access_limit = Some(limit);
        self
    }

    /// Expire at `at`.
    #[must_use]
    pub fn with_expiry(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Whether the entry is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let by_date = self.expires_at.is_some_and(|at| now >= at);
        let by_count = self
            .access_limit
            .is_some_and(|limit| self.access_count >= limit);
        by_date || by_count
    }

    /// Whether the entry is expired now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn file_entry() -> Entry {
        Entry::new(
            "report",
            EntryTarget::File {
                filename: "abc123".to_string(),
                content_type: None,
            },
        )
    }

    #[test]
    fn test_content_type_default() {
        assert_eq!(file_entry().target.content_type(), "text/plain");

        let target = EntryTarget::File {
            filename: "x".to_string(),
            content_type: Some("application/pdf".to_string()),
        };
        assert_eq!(target.content_type(), "application/pdf");

        let target = EntryTarget::File {
            filename: "x".to_string(),
            content_type: Some(String::new()),
        };
        assert_eq!(target.content_type(), "text/plain");
    }

    #[test]
    fn test_not_expired_by_default() {
        assert!(!file_entry().is_expired());
    }

    #[test]
    fn test_expired_by_count() {
        let mut entry = file_entry().with_access_limit(2);
        entry.access_count = 1;
        assert!(!entry.is_expired());
        entry.access_count = 2;
        assert!(entry.is_expired());
    }

    #[test]
    fn test_expired_by_date() {
        let now = Utc::now();
        let entry = file_entry().with_expiry(now + Duration::hours(1));
        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + Duration::hours(2)));
    }

    #[test]
    fn test_json_shape() {
        let entry = Entry::new(
            "docs",
            EntryTarget::Redirect {
                url: "https://example.com/".to_string(),
            },
        )
        .with_rules(RuleSet::parse("10.0.0.0/8"));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["target"]["type"], "redirect");
        assert_eq!(
            json["rules"],
            "# Blacklist with 1 item\n10.0.0.0/8 # Network"
        );

        let back: Entry = serde_json::from_value(json).unwrap();
        assert_eq!(back.rules.matchable_count(), 1);
        assert_eq!(back.target, entry.target);
    }
}
