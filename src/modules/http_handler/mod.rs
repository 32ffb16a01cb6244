//! # HTTP Handler Module
//!
//! Serves shared entries over HTTP/1.1.
//!
//! A request for `/<name>` goes through the [`AccessGate`]; a granted
//! request is answered by the [`Dispatcher`] (file, redirect or reverse
//! proxy), anything else with a 404.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dropgate::modules::http_handler::{ClientIpResolver, Dispatcher, HttpServer};
//!
//! let mut server = HttpServer::new(addr, gate, Dispatcher::new("uploads"), ClientIpResolver::default());
//! server.start().await?;
//! ```
//!
//! [`AccessGate`]: crate::modules::access_control::AccessGate

pub mod client_ip;
pub mod dispatcher;
pub mod error;
pub mod server;

pub use client_ip::ClientIpResolver;
pub use dispatcher::{Dispatcher, CACHE_CONTROL};
pub use error::{HttpError, HttpResult};
pub use server::HttpServer;

/// Body type of every response.
pub type ResponseBody = http_body_util::combinators::UnsyncBoxBody<bytes::Bytes, std::io::Error>;
