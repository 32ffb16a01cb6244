//! # dropgate
//!
//! Share files, redirects and proxied URLs under short names, each guarded
//! by its own network access rules.
//!
//! ## Features
//!
//! - A small rule language: networks, addresses, hostnames, reverse-DNS
//!   patterns, geofences and IP categories
//! - Last-match-wins evaluation that fails closed when geolocation or
//!   category data is missing
//! - Training mode that turns requests into deny rules
//! - Access limits and expiry dates
//!
//! ## Architecture
//!
//! A request for `/<name>` reaches the
//! [`AccessGate`](modules::access_control::AccessGate), which loads the
//! entry from an [`EntryStore`](modules::entry_store::EntryStore),
//! evaluates its rules and records the outcome. Granted requests are
//! answered by the [`Dispatcher`](modules::http_handler::Dispatcher).

pub mod config;
pub mod modules;
