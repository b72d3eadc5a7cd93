use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StoredInstant;

/// One successful resolution of a short code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub id: Uuid,
    pub code: String,
    #[serde(default, skip_serializing_if = "StoredInstant::is_missing")]
    pub timestamp: StoredInstant,
    /// Which surface triggered the resolution (e.g. "direct", "stats")
    pub source: String,
    /// Coarse "City, Country" string, when a lookup succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ClickEvent {
    pub fn new(
        code: impl Into<String>,
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
        location: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            timestamp: timestamp.into(),
            source: source.into(),
            location,
        }
    }
}
