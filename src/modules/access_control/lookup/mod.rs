//! External data sources consulted during rule evaluation.
//!
//! Each source sits behind a trait so deployments can plug in databases
//! or remote services and tests can plug in fakes. [`LookupContext`]
//! bundles the configured sources and bounds every call with a timeout.
//! It does not cache; memoization is per request in the evaluator.

mod dns;
mod geoip;
mod ipcat;

pub use dns::SystemDnsResolver;
pub use geoip::MaxMindGeoResolver;
pub use ipcat::{CategoryInterval, CategorySet};

use super::error::LookupError;
use super::geofence::Geofence;
use async_trait::async_trait;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a single lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Resolves an IP address to an approximate location.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// Locate `ip`; the radius is the accuracy in meters.
    async fn locate(&self, ip: IpAddr) -> Result<Geofence, LookupError>;
}

/// Classifies an IP address into a named category.
#[async_trait]
pub trait CategoryClassifier: Send + Sync {
    /// Category label for `ip`, or `None` if it has none.
    async fn classify(&self, ip: IpAddr) -> Result<Option<String>, LookupError>;
}

/// Forward and reverse DNS.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Addresses of `host`.
    async fn forward(&self, host: &str) -> Result<Vec<IpAddr>, LookupError>;

    /// Lower-cased names of `ip`, without the trailing root dot.
    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, LookupError>;
}

/// The lookup sources available to the evaluator.
#[derive(Clone)]
pub struct LookupContext {
    geo: Option<Arc<dyn GeoResolver>>,
    categories: Option<Arc<dyn CategoryClassifier>>,
    dns: Option<Arc<dyn HostResolver>>,
    timeout: Duration,
}

impl std::fmt::Debug for LookupContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupContext")
            .field("geo", &self.geo.is_some())
            .field("categories", &self.categories.is_some())
            .field("dns", &self.dns.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for LookupContext {
    fn default() -> Self {
        Self::new()
    }
}

impl LookupContext {
    /// Create a context with no sources.
    #[must_use]
    pub fn new() -> Self {
        Self {
            geo: None,
            categories: None,
            dns: None,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    /// Set the geolocation source.
    #[must_use]
    pub fn with_geo(mut self, geo: Arc<dyn GeoResolver>) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Set the category source.
    #[must_use]
    pub fn with_categories(mut self, categories: Arc<dyn CategoryClassifier>) -> Self {
        self.categories = Some(categories);
        self
    }

    /// Set the DNS source.
    #[must_use]
    pub fn with_dns(mut self, dns: Arc<dyn HostResolver>) -> Self {
        self.dns = Some(dns);
        self
    }

    /// Set the per-lookup timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether a geolocation source is configured.
    #[must_use]
    pub fn has_geo(&self) -> bool {
        self.geo.is_some()
    }

    /// Whether a category source is configured.
    #[must_use]
    pub fn has_categories(&self) -> bool {
        self.categories.is_some()
    }

    /// Locate `ip`.
    pub async fn resolve_geo(&self, ip: IpAddr) -> Result<Geofence, LookupError> {
        let geo = self
            .geo
            .as_ref()
            .ok_or(LookupError::NotAvailable("geolocation"))?;
        self.bounded("geolocation", geo.locate(ip)).await
    }

    /// Classify `ip`.
    pub async fn classify(&self, ip: IpAddr) -> Result<Option<String>, LookupError> {
        let categories = self
            .categories
            .as_ref()
            .ok_or(LookupError::NotAvailable("ipcat"))?;
        self.bounded("ipcat", categories.classify(ip)).await
    }

    /// Resolve `host` to addresses.
    pub async fn forward(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        let dns = self.dns.as_ref().ok_or(LookupError::NotAvailable("dns"))?;
        self.bounded("dns", dns.forward(host)).await
    }

    /// Resolve `ip` to names.
    pub async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, LookupError> {
        let dns = self.dns.as_ref().ok_or(LookupError::NotAvailable("dns"))?;
        self.bounded("dns", dns.reverse(ip)).await
    }

    async fn bounded<T>(
        &self,
        kind: &'static str,
        lookup: impl Future<Output = Result<T, LookupError>>,
    ) -> Result<T, LookupError> {
        tokio::time::timeout(self.timeout, lookup)
            .await
            .map_err(|_| LookupError::TimedOut {
                kind,
                timeout: self.timeout,
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowGeo;

    #[async_trait]
    impl GeoResolver for SlowGeo {
        async fn locate(&self, _ip: IpAddr) -> Result<Geofence, LookupError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Geofence::new(0.0, 0.0, 0.0))
        }
    }

    struct FixedCategory(&'static str);

    #[async_trait]
    impl CategoryClassifier for FixedCategory {
        async fn classify(&self, _ip: IpAddr) -> Result<Option<String>, LookupError> {
            Ok(Some(self.0.to_string()))
        }
    }

    #[tokio::test]
    async fn test_missing_sources() {
        let ctx = LookupContext::new();
        let ip: IpAddr = "1.2.3.4".parse().unwrap();

        assert_eq!(
            ctx.resolve_geo(ip).await,
            Err(LookupError::NotAvailable("geolocation"))
        );
        assert_eq!(ctx.classify(ip).await, Err(LookupError::NotAvailable("ipcat")));
        assert!(ctx.reverse(ip).await.unwrap_err().is_not_available());
    }

    #[tokio::test]
    async fn test_timeout() {
        let ctx = LookupContext::new()
            .with_geo(Arc::new(SlowGeo))
            .with_timeout(Duration::from_millis(10));

        let err = ctx.resolve_geo("1.2.3.4".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, LookupError::TimedOut { kind: "geolocation", .. }));
    }

    #[tokio::test]
    async fn test_classify() {
        let ctx = LookupContext::new().with_categories(Arc::new(FixedCategory("Hosting")));
        assert!(ctx.has_categories());
        assert!(!ctx.has_geo());

        let label = ctx.classify("1.2.3.4".parse().unwrap()).await.unwrap();
        assert_eq!(label.as_deref(), Some("Hosting"));
    }
}
