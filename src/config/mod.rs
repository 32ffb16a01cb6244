//! # Configuration System
//!
//! TOML configuration for dropgate: listener, lookup sources, logging and
//! the entries served at startup.
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 8080
//! upload_dir = "/srv/dropgate/uploads"
//!
//! [lookup]
//! geo_database = "/usr/share/GeoIP/GeoLite2-City.mmdb"
//! timeout_ms = 2000
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [[entries]]
//! name = "report"
//! type = "file"
//! filename = "a1b2c3"
//! rules = """
//! !*
//! 10.0.0.0/8
//! """
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{
    DropgateConfig, EntryConfig, LogFormat, LogLevel, LoggingConfig, LookupConfig, ServerConfig,
};
pub use validation::{
    BasicValidator, ValidationError, ValidationResult, ValidationSeverity, Validator,
};
