use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{ClickEvent, CreateUrlRequest, UrlRecord};
use crate::shortener::{ShortenError, ShortenService};
use crate::storage::{PruneReport, RecordStore};

pub struct AppState {
    pub store: Arc<RecordStore>,
    pub shortener: Arc<ShortenService>,
    /// Base URL the short codes are served under
    pub redirect_base_url: String,
}

impl AppState {
    fn short_url(&self, code: &str) -> String {
        format!("{}/{}", self.redirect_base_url.trim_end_matches('/'), code)
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ShortenBatchRequest {
    pub urls: Vec<CreateUrlRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortUrlResponse {
    #[serde(flatten)]
    pub record: UrlRecord,
    pub short_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlDetailResponse {
    #[serde(flatten)]
    pub record: UrlRecord,
    pub short_url: String,
    pub active: bool,
    pub total_clicks: usize,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

fn shorten_status(err: &ShortenError) -> StatusCode {
    match err {
        ShortenError::CodeConflict { .. } => StatusCode::CONFLICT,
        ShortenError::CodeSpaceExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Shorten a batch of URLs
pub async fn create_urls(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ShortenBatchRequest>,
) -> Result<(StatusCode, Json<Vec<ShortUrlResponse>>), ApiError> {
    let records = state
        .shortener
        .shorten(payload.urls)
        .await
        .map_err(|e| api_error(shorten_status(&e), e.to_string()))?;

    let created = records
        .into_iter()
        .map(|record| ShortUrlResponse {
            short_url: state.short_url(&record.code),
            record,
        })
        .collect();

    Ok((StatusCode::CREATED, Json(created)))
}

/// List all shortened URLs in creation order
pub async fn list_urls(State(state): State<Arc<AppState>>) -> Json<Vec<ShortUrlResponse>> {
    let urls = state
        .store
        .get_all()
        .await
        .into_iter()
        .map(|record| ShortUrlResponse {
            short_url: state.short_url(&record.code),
            record,
        })
        .collect();

    Json(urls)
}

/// Get a shortened URL with its click count
pub async fn get_url(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<UrlDetailResponse>, ApiError> {
    let snapshot = state.store.load().await;
    let record = snapshot
        .find(&code)
        .cloned()
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "URL not found"))?;

    Ok(Json(UrlDetailResponse {
        short_url: state.short_url(&record.code),
        active: record.is_active_at(Utc::now()),
        total_clicks: snapshot.clicks_for(&code).count(),
        record,
    }))
}

/// Click events recorded for a code, oldest first
pub async fn list_clicks(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Json<Vec<ClickEvent>> {
    Json(state.store.get_clicks_by_code(&code).await)
}

/// Drop click events of codes that are no longer active
pub async fn prune_expired(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PruneReport>, ApiError> {
    state
        .store
        .prune_expired(Utc::now())
        .await
        .map(Json)
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to prune: {}", e),
            )
        })
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}
