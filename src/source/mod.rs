pub mod youtube;

use chrono::{DateTime, Utc};

use crate::Result;

/// One unit of content as delivered by a source, before id resolution.
///
/// `item_id` may be absent (some sources return entries we cannot address);
/// such items are discarded by [`crate::classify::resolve`] and never stored
/// as seen. `live_hint` carries the source's structured live-broadcast flag
/// when it supplies one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedItem {
    pub item_id: Option<String>,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub url: Option<String>,
    pub live_hint: Option<bool>,
}

/// A resolved item as handed to the notifier. Transient: only its id and
/// timestamp outlive the poll that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub item_id: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub url: Option<String>,
    pub kind: ItemKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Upload,
    Live,
}

/// Client for an external content source.
#[async_trait::async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch up to `limit` most recent items for `source_id`, in whatever
    /// order the source delivers them; callers re-sort when order matters.
    async fn fetch_recent(&self, source_id: &str, limit: usize) -> Result<Vec<FetchedItem>>;

    fn name(&self) -> &'static str;
}
