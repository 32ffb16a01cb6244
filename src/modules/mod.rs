//! # Modules
//!
//! - [`access_control`] - Rule language, evaluation and the access gate
//! - [`entry_store`] - Shared entries and their storage
//! - [`http_handler`] - HTTP listener and response dispatch
//! - [`logging`] - Subscriber setup for structured logging

pub mod access_control;
pub mod entry_store;
pub mod http_handler;
pub mod logging;
