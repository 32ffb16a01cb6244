//! # Access Control Module
//!
//! Per-entry access rules and the gate that enforces them.
//!
//! ## Rule language
//!
//! A policy is plain text with one rule per line. `#` starts a comment.
//!
//! - `*` matches everyone
//! - `10.0.0.0/8` matches a network, `192.0.2.7` a single address
//! - `example.com` matches by forward or reverse DNS
//! - `~\.example\.net$` matches reverse-DNS names by regular expression
//! - `@ 52.52, 13.40 (10km)` matches requesters located in a circle
//! - `ipcat tor*` matches third-party IP category labels
//!
//! Rules are evaluated in order and the last match decides. A match denies;
//! a `!` prefix turns the rule into an allow. No match allows.
//!
//! ## Usage
//!
//! ```ignore
//! use dropgate::modules::access_control::{AccessGate, LookupContext};
//!
//! let gate = AccessGate::new(store, LookupContext::new());
//! match gate.access("report", client_ip).await? {
//!     Some(entry) => { /* serve the entry */ },
//!     None => { /* 404 */ },
//! }
//! ```

mod error;
mod evaluator;
mod gate;
mod geofence;
pub mod lookup;
mod rule;
mod ruleset;

pub use error::{AccessControlError, AccessControlResult, LookupError};
pub use evaluator::{evaluate, Decision, Evaluator};
pub use gate::{AccessGate, GateResult, GateStats};
pub use geofence::{Geofence, Intersection, EARTH_RADIUS_M};
pub use lookup::{
    CategoryClassifier, GeoResolver, HostResolver, LookupContext, DEFAULT_LOOKUP_TIMEOUT,
};
pub use rule::{
    canonical_ip, canonical_network, parse_geofence, CategoryGlob, Rule, RuleKind,
    DEFAULT_GEOFENCE_RADIUS,
};
pub use ruleset::RuleSet;
