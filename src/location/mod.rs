//! Best-effort coarse location of whoever follows a short link
//!
//! Lookups are advisory: every failure collapses to "no location" at the
//! resolver, which never waits on a provider longer than its timeout.

pub mod geoip;
pub mod ip_api;
pub mod ip_extractor;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::{LocationBackend, LocationConfig};

pub use geoip::GeoIpLocator;
pub use ip_api::IpApiLocator;
pub use ip_extractor::{extract_client_ip, TrustedProxyMode};

#[derive(Debug, Error)]
pub enum LocationLookupError {
    #[error("location request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("location service refused the lookup: {0}")]
    Refused(String),
    #[error("location database error: {0}")]
    Database(String),
    #[error("location lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// City/country pair as reported by a provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoarseLocation {
    pub city: Option<String>,
    pub country: Option<String>,
}

impl CoarseLocation {
    /// "City, Country" from whichever parts are present
    pub fn label(&self) -> Option<String> {
        let parts: Vec<&str> = [self.city.as_deref(), self.country.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Locate `client_ip`, or the caller's own network when it is unknown
    async fn locate(
        &self,
        client_ip: Option<IpAddr>,
    ) -> Result<Option<CoarseLocation>, LocationLookupError>;
}

/// Addresses a public lookup service cannot place
pub(crate) fn is_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation())
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80)
        }
    }
}

/// Build the configured provider, if any
pub fn from_config(
    config: &LocationConfig,
) -> anyhow::Result<Option<Arc<dyn LocationProvider>>> {
    let provider: Arc<dyn LocationProvider> = match config.provider {
        LocationBackend::None => return Ok(None),
        LocationBackend::IpApi => {
            info!("Location lookups via {}", config.api_url);
            Arc::new(IpApiLocator::new(&config.api_url, config.timeout())?)
        }
        LocationBackend::GeoIp => {
            let path = config
                .geoip_city_db
                .as_deref()
                .context("GEOIP_CITY_DB is required for the geoip provider")?;
            info!("Location lookups via GeoIP database {}", path);
            Arc::new(GeoIpLocator::new(path)?)
        }
    };

    Ok(Some(provider))
}
