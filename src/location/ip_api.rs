//! Lookup through an ipapi.co-compatible JSON endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::trace;

use super::{is_routable, CoarseLocation, LocationLookupError, LocationProvider};

pub const DEFAULT_IP_API_URL: &str = "https://ipapi.co";

/// Subset of the ipapi.co response we read
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country_name: Option<String>,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    reason: Option<String>,
}

pub struct IpApiLocator {
    client: Client,
    base_url: String,
}

impl IpApiLocator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LocationLookupError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("linkstash/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, client_ip: Option<IpAddr>) -> String {
        match client_ip {
            Some(ip) => format!("{}/{}/json/", self.base_url, ip),
            None => format!("{}/json/", self.base_url),
        }
    }
}

#[async_trait]
impl LocationProvider for IpApiLocator {
    async fn locate(
        &self,
        client_ip: Option<IpAddr>,
    ) -> Result<Option<CoarseLocation>, LocationLookupError> {
        if client_ip.is_some_and(|ip| !is_routable(ip)) {
            trace!(?client_ip, "skipping lookup for non-routable address");
            return Ok(None);
        }

        let body: IpApiResponse = self
            .client
            .get(self.url_for(client_ip))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if body.error {
            return Err(LocationLookupError::Refused(
                body.reason.unwrap_or_else(|| "unknown reason".to_string()),
            ));
        }

        let location = CoarseLocation {
            city: body.city,
            country: body.country_name,
        };
        trace!(?location, "ipapi lookup");

        Ok(location.label().is_some().then_some(location))
    }
}
