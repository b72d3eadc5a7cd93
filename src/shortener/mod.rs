//! Batch creation of short links
//!
//! A batch is validated completely before anything is written, so either
//! every request becomes a record or the store is left as it was.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::ShortenerConfig;
use crate::models::{CreateUrlRequest, UrlRecord, ValidityInput};
use crate::shortcode;
use crate::storage::{RecordStore, StorageError};

/// Attempts per request before giving up on finding a free generated code
pub const MAX_GENERATION_ATTEMPTS: usize = 64;

/// Input errors, reported with the 1-based row of the offending request
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShortenError {
    #[error("Batch must contain between 1 and {max} URLs, got {got}")]
    BatchSize { got: usize, max: usize },
    #[error("Row {row}: Invalid URL")]
    InvalidUrl { row: usize, url: String },
    #[error("Row {row}: Validity must be a positive integer")]
    InvalidValidity { row: usize },
    #[error("Row {row}: Invalid shortcode (letters, digits, '-' or '_', 3-20 chars)")]
    InvalidCode { row: usize, code: String },
    #[error("Row {row}: Shortcode already taken")]
    CodeConflict { row: usize, code: String },
    #[error("Row {row}: could not find a free shortcode after {attempts} attempts")]
    CodeSpaceExhausted { row: usize, attempts: usize },
}

pub type ShortenResult<T> = Result<T, ShortenError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("validity must be a positive integer")]
pub struct InvalidValidity;

/// A request that passed validation
struct ValidRequest {
    long_url: String,
    minutes: Option<u32>,
    custom_code: Option<String>,
}

pub struct ShortenService {
    store: Arc<RecordStore>,
    config: ShortenerConfig,
}

impl ShortenService {
    pub fn new(store: Arc<RecordStore>, config: ShortenerConfig) -> Self {
        Self { store, config }
    }

    pub async fn shorten(&self, batch: Vec<CreateUrlRequest>) -> ShortenResult<Vec<UrlRecord>> {
        self.shorten_at(batch, Utc::now()).await
    }

    /// Validate and persist `batch`, returning records in request order
    pub async fn shorten_at(
        &self,
        batch: Vec<CreateUrlRequest>,
        now: DateTime<Utc>,
    ) -> ShortenResult<Vec<UrlRecord>> {
        let result = self.create_records(batch, now).await;

        match &result {
            Ok(records) => info!(count = records.len(), "shortened URLs"),
            Err(err) => warn!(error = %err, "shorten request rejected"),
        }
        result
    }

    async fn create_records(
        &self,
        batch: Vec<CreateUrlRequest>,
        now: DateTime<Utc>,
    ) -> ShortenResult<Vec<UrlRecord>> {
        let max = self.config.max_batch_size;
        if batch.is_empty() || batch.len() > max {
            return Err(ShortenError::BatchSize {
                got: batch.len(),
                max,
            });
        }

        let snapshot = self.store.load().await;

        // Pass 1: validate everything before allocating anything
        let mut requested_codes = HashSet::new();
        let mut valid = Vec::with_capacity(batch.len());
        for (index, request) in batch.into_iter().enumerate() {
            let row = index + 1;
            let request = validate_request(row, request)?;

            if let Some(code) = &request.custom_code {
                if snapshot.contains_code(code) || !requested_codes.insert(code.clone()) {
                    return Err(ShortenError::CodeConflict {
                        row,
                        code: code.clone(),
                    });
                }
            }
            valid.push(request);
        }

        // Pass 2: assign codes, never reusing one from history or this batch
        let mut reserved = requested_codes;
        let mut records = Vec::with_capacity(valid.len());
        for (index, request) in valid.into_iter().enumerate() {
            let custom = request.custom_code.is_some();
            let code = match request.custom_code {
                Some(code) => code,
                None => {
                    let code = self.generate_free_code(index + 1, |candidate| {
                        snapshot.contains_code(candidate) || reserved.contains(candidate)
                    })?;
                    reserved.insert(code.clone());
                    code
                }
            };

            let minutes = request
                .minutes
                .unwrap_or(self.config.default_validity_minutes);

            records.push(UrlRecord {
                id: Uuid::new_v4(),
                code,
                long_url: request.long_url,
                created_at: now.into(),
                expires_at: (now + Duration::minutes(i64::from(minutes))).into(),
                custom,
            });
        }

        match self.store.insert_records(records.clone()).await {
            Ok(()) => Ok(records),
            Err(StorageError::Conflict(code)) => {
                // Taken between validation and insert
                let row = records
                    .iter()
                    .position(|record| record.code == code)
                    .map_or(1, |index| index + 1);
                Err(ShortenError::CodeConflict { row, code })
            }
            Err(err) => {
                error!(error = %err, "short URLs were not saved");
                Ok(records)
            }
        }
    }

    fn generate_free_code(
        &self,
        row: usize,
        is_taken: impl Fn(&str) -> bool,
    ) -> ShortenResult<String> {
        (0..MAX_GENERATION_ATTEMPTS)
            .map(|_| shortcode::generate(self.config.generated_code_length))
            .find(|candidate| !is_taken(candidate.as_str()))
            .ok_or(ShortenError::CodeSpaceExhausted {
                row,
                attempts: MAX_GENERATION_ATTEMPTS,
            })
    }
}

fn validate_request(row: usize, request: CreateUrlRequest) -> ShortenResult<ValidRequest> {
    let Some(long_url) = normalize_url(request.url.trim()) else {
        return Err(ShortenError::InvalidUrl {
            row,
            url: request.url,
        });
    };

    let minutes = match request.minutes {
        Some(input) => {
            parse_validity_minutes(&input).map_err(|_| ShortenError::InvalidValidity { row })?
        }
        None => None,
    };

    let custom_code = request.custom_code.filter(|code| !code.is_empty());
    if let Some(code) = &custom_code {
        if !shortcode::is_syntactically_valid(code) {
            return Err(ShortenError::InvalidCode {
                row,
                code: code.clone(),
            });
        }
    }

    Ok(ValidRequest {
        long_url,
        minutes,
        custom_code,
    })
}

/// Absolute URL with an `http` or `https` scheme
pub fn is_valid_url(candidate: &str) -> bool {
    normalize_url(candidate).is_some()
}

/// Serialized form of a valid URL, percent-encoded so it fits a `Location` header
pub fn normalize_url(candidate: &str) -> Option<String> {
    Url::parse(candidate)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .map(String::from)
}

/// Parse a validity window in minutes.
///
/// Blank text means "not given". Anything else must read as a number with
/// no fractional part (`"5"`, `"5.0"`, `"1e3"`) that is positive.
pub fn parse_validity_minutes(input: &ValidityInput) -> Result<Option<u32>, InvalidValidity> {
    let minutes = match input {
        ValidityInput::Number(minutes) => *minutes,
        ValidityInput::Text(text) if text.trim().is_empty() => return Ok(None),
        ValidityInput::Text(text) => text.trim().parse::<f64>().map_err(|_| InvalidValidity)?,
    };

    if !minutes.is_finite() || minutes.fract() != 0.0 || minutes <= 0.0 {
        return Err(InvalidValidity);
    }
    if minutes > f64::from(u32::MAX) {
        return Err(InvalidValidity);
    }
    Ok(Some(minutes as u32))
}
