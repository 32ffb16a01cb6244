//! DNS lookups through the system resolver configuration.

use super::HostResolver;
use crate::modules::access_control::error::{
    AccessControlError, AccessControlResult, LookupError,
};
use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;

/// Forward and reverse resolution with hickory.
pub struct SystemDnsResolver {
    resolver: TokioAsyncResolver,
}

impl std::fmt::Debug for SystemDnsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemDnsResolver").finish_non_exhaustive()
    }
}

impl SystemDnsResolver {
    /// Build a resolver from `/etc/resolv.conf` (or the platform equivalent).
    pub fn from_system_conf() -> AccessControlResult<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| AccessControlError::Resolver(e.to_string()))?;
        Ok(Self { resolver })
    }
}

/// Lower-case a DNS name and drop the trailing root label.
pub(crate) fn normalize_name(name: &str) -> String {
    name.trim_end_matches('.').to_lowercase()
}

#[async_trait]
impl HostResolver for SystemDnsResolver {
    async fn forward(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        let lookup = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| LookupError::failed("dns", e.to_string()))?;
        Ok(lookup.iter().collect())
    }

    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, LookupError> {
        let lookup = self
            .resolver
            .reverse_lookup(ip)
            .await
            .map_err(|e| LookupError::failed("dns", e.to_string()))?;
        Ok(lookup
            .iter()
            .map(|name| normalize_name(&name.to_string()))
            .collect())
    }
}
