//! Configuration file loader.

use super::error::{ConfigError, ConfigResult};
use super::types::DropgateConfig;
use super::validation::{BasicValidator, ValidationSeverity, Validator};
use std::path::Path;
use tracing::{debug, warn};

/// Configuration loader with validation support.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Validators to run on loaded configuration.
    validators: Vec<Box<dyn Validator>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader running the [`BasicValidator`].
    #[must_use]
    pub fn new() -> Self {
        Self::unvalidated().with_validator(BasicValidator::new())
    }

    /// Create a loader without validators.
    #[must_use]
    pub fn unvalidated() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    /// Add a validator to the loader.
    #[must_use]
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Read and validate the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] for a missing file, otherwise a
    /// read, parse or validation error.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<DropgateConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::ReadError {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let config = self.load_str(&content)?;
        debug!(path = %path.display(), entries = config.entries.len(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate TOML text.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed TOML and a validation error
    /// listing every failed check.
    pub fn load_str(&self, content: &str) -> ConfigResult<DropgateConfig> {
        let config: DropgateConfig = toml::from_str(content)?;
        self.validate(&config)?;
        Ok(config)
    }

    fn validate(&self, config: &DropgateConfig) -> ConfigResult<()> {
        let mut failures = Vec::new();

        for validator in &self.validators {
            let result = validator.validate(config);
            for issue in result.warnings() {
                warn!(field = %issue.field, "{}", issue.message);
            }
            if !result.is_valid() {
                failures.extend(
                    result
                        .errors()
                        .iter()
                        .filter(|e| e.severity == ValidationSeverity::Error)
                        .map(|e| format!("{}: {}", e.field, e.message)),
                );
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(failures.join("; ")))
        }
    }
}
