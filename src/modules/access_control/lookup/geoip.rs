//! Geolocation from a MaxMind GeoIP2/GeoLite2 City database.

use super::GeoResolver;
use crate::modules::access_control::error::{
    AccessControlError, AccessControlResult, LookupError,
};
use crate::modules::access_control::geofence::Geofence;
use async_trait::async_trait;
use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use tracing::info;

/// City database reader.
pub struct MaxMindGeoResolver {
    reader: Reader<Vec<u8>>,
}

impl std::fmt::Debug for MaxMindGeoResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaxMindGeoResolver")
            .field("database_type", &self.reader.metadata.database_type)
            .finish()
    }
}

impl MaxMindGeoResolver {
    /// Open a database file into memory.
    pub fn open(path: impl AsRef<Path>) -> AccessControlResult<Self> {
        let path = path.as_ref();
        let reader =
            Reader::open_readfile(path).map_err(|e| AccessControlError::GeoDatabase {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        info!(
            path = %path.display(),
            database_type = %reader.metadata.database_type,
            "Opened geolocation database"
        );
        Ok(Self { reader })
    }
}

#[async_trait]
impl GeoResolver for MaxMindGeoResolver {
    async fn locate(&self, ip: IpAddr) -> Result<Geofence, LookupError> {
        let city: geoip2::City = self
            .reader
            .lookup(ip)
            .map_err(|e| LookupError::failed("geolocation", e.to_string()))?;

        let location = city
            .location
            .ok_or_else(|| LookupError::failed("geolocation", format!("no location for {ip}")))?;

        let (Some(latitude), Some(longitude)) = (location.latitude, location.longitude) else {
            return Err(LookupError::failed(
                "geolocation",
                format!("no coordinates for {ip}"),
            ));
        };

        // Accuracy is reported in kilometers.
        let radius = f64::from(location.accuracy_radius.unwrap_or(0)) * 1000.0;

        Ok(Geofence::new(latitude, longitude, radius))
    }
}
