use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A short code mapped to its long URL.
///
/// Records are never mutated after creation and never deleted on expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlRecord {
    pub id: Uuid,
    pub code: String,
    pub long_url: String,
    #[serde(default, skip_serializing_if = "StoredInstant::is_missing")]
    pub created_at: StoredInstant,
    #[serde(default, skip_serializing_if = "StoredInstant::is_missing")]
    pub expires_at: StoredInstant,
    #[serde(default)]
    pub custom: bool,
}

impl UrlRecord {
    /// Whether the record still resolves at `now`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_after(now)
    }
}

/// Instant as found in the durable blob.
///
/// Values that do not parse as RFC 3339 are kept verbatim so that a
/// load/save cycle writes them back unchanged. As an expiry they never
/// expire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredInstant {
    Parsed(DateTime<Utc>),
    Unparsed(serde_json::Value),
}

impl StoredInstant {
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            StoredInstant::Parsed(at) => Some(*at),
            StoredInstant::Unparsed(_) => None,
        }
    }

    /// True when the instant lies strictly after `now`, or cannot be read
    pub fn is_after(&self, now: DateTime<Utc>) -> bool {
        match self {
            StoredInstant::Parsed(at) => *at > now,
            StoredInstant::Unparsed(_) => true,
        }
    }

    pub(crate) fn is_missing(&self) -> bool {
        matches!(self, StoredInstant::Unparsed(serde_json::Value::Null))
    }
}

impl Default for StoredInstant {
    fn default() -> Self {
        StoredInstant::Unparsed(serde_json::Value::Null)
    }
}

impl From<DateTime<Utc>> for StoredInstant {
    fn from(at: DateTime<Utc>) -> Self {
        StoredInstant::Parsed(at)
    }
}

/// One row of a shorten batch
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUrlRequest {
    pub url: String,
    #[serde(default)]
    pub minutes: Option<ValidityInput>,
    #[serde(default)]
    pub custom_code: Option<String>,
}

impl CreateUrlRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_minutes(mut self, minutes: impl Into<ValidityInput>) -> Self {
        self.minutes = Some(minutes.into());
        self
    }

    pub fn with_custom_code(mut self, code: impl Into<String>) -> Self {
        self.custom_code = Some(code.into());
        self
    }
}

/// Validity window as typed by the user: either a JSON number or free text
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ValidityInput {
    Number(f64),
    Text(String),
}

impl From<i64> for ValidityInput {
    fn from(minutes: i64) -> Self {
        ValidityInput::Number(minutes as f64)
    }
}

impl From<&str> for ValidityInput {
    fn from(text: &str) -> Self {
        ValidityInput::Text(text.to_string())
    }
}

impl From<String> for ValidityInput {
    fn from(text: String) -> Self {
        ValidityInput::Text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn record_json(expires_at: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "6f9619ff-8b86-d011-b42d-00cf4fc964ff",
            "code": "abc123",
            "longUrl": "https://example.com",
            "createdAt": "2024-05-01T10:00:00Z",
            "expiresAt": expires_at,
            "custom": false
        })
    }

    #[test]
    fn parses_rfc3339_expiry() {
        let record: UrlRecord =
            serde_json::from_value(record_json(json!("2024-05-01T10:30:00.000Z"))).unwrap();
        let expires = record.expires_at.as_datetime().unwrap();
        assert_eq!(expires.to_rfc3339(), "2024-05-01T10:30:00+00:00");
        assert!(record.is_active_at(expires - Duration::seconds(1)));
        assert!(!record.is_active_at(expires));
    }

    #[test]
    fn garbage_expiry_is_kept_and_never_expires() {
        let raw = record_json(json!("not a date"));
        let record: UrlRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(
            record.expires_at,
            StoredInstant::Unparsed(json!("not a date"))
        );
        assert!(record.is_active_at(Utc::now() + Duration::days(3650)));
        assert_eq!(serde_json::to_value(&record).unwrap(), raw);
    }

    #[test]
    fn missing_optional_fields_use_defaults() {
        let record: UrlRecord = serde_json::from_value(json!({
            "id": "6f9619ff-8b86-d011-b42d-00cf4fc964ff",
            "code": "abc123",
            "longUrl": "https://example.com",
            "createdAt": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert!(!record.custom);
        assert!(record.expires_at.as_datetime().is_none());
        assert!(record.is_active_at(Utc::now()));
    }

    #[test]
    fn validity_input_accepts_number_or_text() {
        let req: CreateUrlRequest =
            serde_json::from_value(json!({"url": "https://a.io", "minutes": 10})).unwrap();
        assert_eq!(req.minutes, Some(ValidityInput::Number(10.0)));

        let req: CreateUrlRequest =
            serde_json::from_value(json!({"url": "https://a.io", "minutes": 2.5})).unwrap();
        assert_eq!(req.minutes, Some(ValidityInput::Number(2.5)));

        let req: CreateUrlRequest =
            serde_json::from_value(json!({"url": "https://a.io", "minutes": "15"})).unwrap();
        assert_eq!(req.minutes, Some(ValidityInput::Text("15".into())));
    }

    #[test]
    fn garbage_creation_time_is_kept() {
        let mut raw = record_json(json!("2024-05-01T10:30:00Z"));
        raw["createdAt"] = json!("yesterday-ish");

        let record: UrlRecord = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(record.created_at, StoredInstant::Unparsed(json!("yesterday-ish")));
        assert_eq!(serde_json::to_value(&record).unwrap(), raw);
    }
}
