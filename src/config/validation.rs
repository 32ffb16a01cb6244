//! Configuration validation system.

use super::types::DropgateConfig;
use crate::modules::entry_store::EntryTarget;
use ipnet::IpNet;
use std::collections::HashSet;

/// A single validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
    /// Severity level.
    pub severity: ValidationSeverity,
}

impl ValidationError {
    /// Create a new error.
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Create a new warning.
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }
}

/// Severity of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Error - configuration is invalid.
    Error,
    /// Warning - configuration may have issues.
    Warning,
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a new empty (valid) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Check if the validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self
            .errors
            .iter()
            .any(|e| e.severity == ValidationSeverity::Error)
    }

    /// Get all validation issues.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Get only warnings.
    #[must_use]
    pub fn warnings(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Warning)
            .collect()
    }
}

/// Trait for configuration validators.
pub trait Validator: std::fmt::Debug + Send + Sync {
    /// Validate a configuration and return any errors.
    fn validate(&self, config: &DropgateConfig) -> ValidationResult;
}

/// Built-in validator for basic configuration checks.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create a new basic validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn is_absolute_url(url: &str) -> bool {
    url.parse::<http::Uri>()
        .is_ok_and(|uri| uri.scheme().is_some() && uri.authority().is_some())
}

impl Validator for BasicValidator {
    fn validate(&self, config: &DropgateConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        if config.server.port == 0 {
            result.add_error(ValidationError::error(
                "server.port",
                "Server port cannot be 0",
            ));
        }

        for proxy in &config.server.trusted_proxies {
            if proxy.parse::<IpNet>().is_err() {
                result.add_error(ValidationError::error(
                    "server.trusted_proxies",
                    format!("Invalid CIDR range: {proxy}"),
                ));
            }
        }

        if !config.server.trusted_proxies.is_empty() && !config.server.trust_proxy_headers {
            result.add_error(ValidationError::warning(
                "server.trusted_proxies",
                "Trusted proxies have no effect unless trust_proxy_headers is set",
            ));
        }

        if config.lookup.timeout_ms == 0 {
            result.add_error(ValidationError::error(
                "lookup.timeout_ms",
                "Lookup timeout cannot be 0",
            ));
        }

        let mut seen_names = HashSet::new();
        for entry in &config.entries {
            if !seen_names.insert(&entry.name) {
                result.add_error(ValidationError::error(
                    format!("entries.{}", entry.name),
                    format!("Duplicate entry name: {}", entry.name),
                ));
            }

            if !is_valid_name(&entry.name) {
                result.add_error(ValidationError::error(
                    "entries[].name",
                    format!("Invalid entry name: {:?}", entry.name),
                ));
            }

            match &entry.target {
                EntryTarget::File { filename, .. } => {
                    if filename.is_empty() || filename.contains('/') || filename == ".." {
                        result.add_error(ValidationError::error(
                            format!("entries.{}.filename", entry.name),
                            format!("Invalid file name: {filename:?}"),
                        ));
                    }
                },
                EntryTarget::Redirect { url } | EntryTarget::Proxy { url } => {
                    if !is_absolute_url(url) {
                        result.add_error(ValidationError::error(
                            format!("entries.{}.url", entry.name),
                            format!("URL must be absolute: {url}"),
                        ));
                    }
                },
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EntryConfig;

    fn entry(name: &str, target: EntryTarget) -> EntryConfig {
        EntryConfig {
            name: name.to_string(),
            target,
            rules: String::new(),
            training: false,
            access_limit: None,
            expires_at: None,
        }
    }

    fn redirect(url: &str) -> EntryTarget {
        EntryTarget::Redirect {
            url: url.to_string(),
        }
    }

    #[test]
    fn test_basic_validator_valid() {
        let config = DropgateConfig::default();
        let result = BasicValidator::new().validate(&config);
        assert!(result.is_valid());
    }

    #[test]
    fn test_zero_port() {
        let mut config = DropgateConfig::default();
        config.server.port = 0;

        let result = BasicValidator::new().validate(&config);
        assert!(!result.is_valid());
        assert!(result.errors()[0].message.contains("port cannot be 0"));
    }

    #[test]
    fn test_invalid_proxy_cidr() {
        let mut config = DropgateConfig::default();
        config.server.trust_proxy_headers = true;
        config.server.trusted_proxies = vec!["10.0.0.0/8".to_string(), "nope".to_string()];

        let result = BasicValidator::new().validate(&config);
        assert!(!result.is_valid());
        assert_eq!(result.errors().len(), 1);
        assert!(result.errors()[0].message.contains("nope"));
    }

    #[test]
    fn test_unused_proxies_warn() {
        let mut config = DropgateConfig::default();
        config.server.trusted_proxies = vec!["10.0.0.0/8".to_string()];

        let result = BasicValidator::new().validate(&config);
        assert!(result.is_valid());
        assert_eq!(result.warnings().len(), 1);
    }

    #[test]
    fn test_duplicate_entries() {
        let mut config = DropgateConfig::default();
        config.entries.push(entry("a", redirect("https://example.com/")));
        config.entries.push(entry("a", redirect("https://example.org/")));

        let result = BasicValidator::new().validate(&config);
        assert!(!result.is_valid());
        assert!(result.errors()[0].message.contains("Duplicate"));
    }

    #[test]
    fn test_entry_targets() {
        let mut config = DropgateConfig::default();
        config.entries.push(entry("rel", redirect("/relative")));
        config.entries.push(entry(
            "file",
            EntryTarget::File {
                filename: "../etc/passwd".to_string(),
                content_type: None,
            },
        ));
        config.entries.push(entry("bad name", redirect("https://example.com/")));

        let result = BasicValidator::new().validate(&config);
        assert_eq!(result.errors().len(), 3);
    }
}
