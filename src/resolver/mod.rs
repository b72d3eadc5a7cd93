//! Short code resolution
//!
//! `Pending -> {Redirecting, NotFound, Expired}`. Only a redirect records a
//! click, and at most one append is attempted per resolution. Neither the
//! location lookup nor the click append can keep a caller from its
//! destination.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::location::{LocationLookupError, LocationProvider};
use crate::models::ClickEvent;
use crate::storage::RecordStore;

/// Upper bound for a location lookup
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Source tag used when the caller does not name one
pub const DEFAULT_SOURCE: &str = "direct";

/// Terminal state of a resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RedirectOutcome {
    Redirecting { long_url: String },
    NotFound,
    Expired { expired_at: DateTime<Utc> },
}

/// Where a resolution request came from
#[derive(Debug, Clone)]
pub struct ResolveContext {
    pub source: String,
    pub client_ip: Option<IpAddr>,
}

impl ResolveContext {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            client_ip: None,
        }
    }

    pub fn with_client_ip(mut self, client_ip: IpAddr) -> Self {
        self.client_ip = Some(client_ip);
        self
    }
}

impl Default for ResolveContext {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE)
    }
}

pub struct Resolver {
    store: Arc<RecordStore>,
    locator: Option<Arc<dyn LocationProvider>>,
    lookup_timeout: Duration,
}

impl Resolver {
    pub fn new(
        store: Arc<RecordStore>,
        locator: Option<Arc<dyn LocationProvider>>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            store,
            locator,
            lookup_timeout,
        }
    }

    pub async fn resolve(&self, code: &str, ctx: ResolveContext) -> RedirectOutcome {
        self.resolve_at(code, ctx, Utc::now()).await
    }

    pub async fn resolve_at(
        &self,
        code: &str,
        ctx: ResolveContext,
        now: DateTime<Utc>,
    ) -> RedirectOutcome {
        let Some(record) = self.store.get_by_code(code).await else {
            warn!(code = %code, "short code not found");
            return RedirectOutcome::NotFound;
        };

        if !record.is_active_at(now) {
            info!(code = %code, "short code expired");
            // An unparseable expiry never lands here
            let expired_at = record.expires_at.as_datetime().unwrap_or(now);
            return RedirectOutcome::Expired { expired_at };
        }

        let location = self.coarse_location(ctx.client_ip).await;
        let event = ClickEvent::new(code, Utc::now(), ctx.source, location);

        if let Err(err) = self.store.append_click(event).await {
            warn!(code = %code, error = %err, "failed to record click");
        }

        RedirectOutcome::Redirecting {
            long_url: record.long_url,
        }
    }

    async fn coarse_location(&self, client_ip: Option<IpAddr>) -> Option<String> {
        let locator = self.locator.as_ref()?;

        let lookup = tokio::time::timeout(self.lookup_timeout, locator.locate(client_ip))
            .await
            .unwrap_or(Err(LocationLookupError::Timeout(self.lookup_timeout)));

        match lookup {
            Ok(Some(location)) => location.label(),
            Ok(None) => {
                debug!(?client_ip, "no location available");
                None
            }
            Err(err) => {
                warn!(error = %err, "location lookup failed");
                None
            }
        }
    }
}
