use serde::{Deserialize, Serialize};

use super::{ClickEvent, UrlRecord};

/// Everything kept under the store's namespace key, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub urls: Vec<UrlRecord>,
    #[serde(default)]
    pub clicks: Vec<ClickEvent>,
}

impl StoreSnapshot {
    pub fn find(&self, code: &str) -> Option<&UrlRecord> {
        self.urls.iter().find(|url| url.code == code)
    }

    pub fn contains_code(&self, code: &str) -> bool {
        self.find(code).is_some()
    }

    pub fn clicks_for<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a ClickEvent> + 'a {
        self.clicks.iter().filter(move |click| click.code == code)
    }
}
