//! Offline lookup using a MaxMind GeoLite2/GeoIP2 City MMDB

use anyhow::{Context, Result};
use async_trait::async_trait;
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

use super::{is_routable, CoarseLocation, LocationLookupError, LocationProvider};

/// Memory-mapped City database, cheap to clone
#[derive(Clone)]
pub struct GeoIpLocator {
    city_reader: Arc<Reader<Mmap>>,
}

impl GeoIpLocator {
    pub fn new(city_path: &str) -> Result<Self> {
        let reader = unsafe { Reader::open_mmap(city_path) }
            .with_context(|| format!("Failed to open GeoIP City database at {}", city_path))?;

        Ok(Self {
            city_reader: Arc::new(reader),
        })
    }

    fn lookup(&self, ip: IpAddr) -> Result<Option<CoarseLocation>, LocationLookupError> {
        let result = self
            .city_reader
            .lookup(ip)
            .map_err(|e| LocationLookupError::Database(e.to_string()))?;

        if let Ok(Some(city)) = result.decode::<geoip2::City>() {
            let location = CoarseLocation {
                city: city.city.names.english.map(|s| s.to_string()),
                country: city.country.names.english.map(|s| s.to_string()),
            };
            return Ok(location.label().is_some().then_some(location));
        }

        // Country-only entries still carry a name
        match result.decode::<geoip2::Country>() {
            Ok(Some(country)) => Ok(country
                .country
                .names
                .english
                .map(|name| CoarseLocation {
                    city: None,
                    country: Some(name.to_string()),
                })),
            Ok(None) => Ok(None),
            Err(e) => Err(LocationLookupError::Database(e.to_string())),
        }
    }
}

#[async_trait]
impl LocationProvider for GeoIpLocator {
    async fn locate(
        &self,
        client_ip: Option<IpAddr>,
    ) -> Result<Option<CoarseLocation>, LocationLookupError> {
        // Without an address there is nothing to look up offline
        match client_ip {
            Some(ip) if is_routable(ip) => self.lookup(ip),
            _ => Ok(None),
        }
    }
}
