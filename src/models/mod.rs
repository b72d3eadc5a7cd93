mod click;
mod snapshot;
mod url;

pub use click::ClickEvent;
pub use snapshot::StoreSnapshot;
pub use url::{CreateUrlRequest, StoredInstant, UrlRecord, ValidityInput};
