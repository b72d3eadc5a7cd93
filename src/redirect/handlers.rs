use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header::HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::location::{extract_client_ip, TrustedProxyMode};
use crate::resolver::{RedirectOutcome, ResolveContext, Resolver, DEFAULT_SOURCE};

pub struct RedirectState {
    pub resolver: Arc<Resolver>,
    pub trusted_proxy_mode: TrustedProxyMode,
    pub trusted_hops: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct RedirectQuery {
    /// Surface that produced the link, recorded with the click
    pub src: Option<String>,
}

/// Resolve a short code and redirect to its long URL
pub async fn redirect_url(
    State(state): State<Arc<RedirectState>>,
    Path(code): Path<String>,
    Query(query): Query<RedirectQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let client_ip = extract_client_ip(
        &headers,
        addr.ip(),
        state.trusted_proxy_mode,
        state.trusted_hops,
    );
    let source = query
        .src
        .filter(|src| !src.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SOURCE.to_string());

    let ctx = ResolveContext::new(source).with_client_ip(client_ip);

    match state.resolver.resolve(&code, ctx).await {
        // Temporary: the same code stops resolving once it expires
        RedirectOutcome::Redirecting { long_url } => Redirect::temporary(&long_url).into_response(),
        RedirectOutcome::NotFound => (StatusCode::NOT_FOUND, "Short URL not found").into_response(),
        RedirectOutcome::Expired { .. } => {
            (StatusCode::GONE, "This short URL has expired").into_response()
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
