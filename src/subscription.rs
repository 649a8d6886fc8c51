//! Subscription records and their pure state transitions.
//!
//! All mutation of durable state goes through [`crate::store::SubscriptionStore::mutate`],
//! which applies one of the transition methods below under the store lock.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::Item;

/// Identity of one (scope, source) pairing.
///
/// At most one subscription exists per pair; `key()` doubles as the
/// persisted map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId {
    pub scope: String,
    pub source_id: String,
}

impl SubscriptionId {
    pub fn new(scope: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            source_id: source_id.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.scope, self.source_id)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.source_id)
    }
}

/// The most recent item the scheduler has notified for a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenPointer {
    pub item_id: String,
    pub published_at: DateTime<Utc>,
}

/// One durable (source, destination) binding with its de-duplication state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub scope: String,
    pub source_id: String,
    pub destination_id: String,
    #[serde(default)]
    pub last_seen: Option<SeenPointer>,
    #[serde(default)]
    pub notified: NotifiedSet,
    #[serde(default)]
    pub last_poll_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn new(
        scope: impl Into<String>,
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            last_seen: None,
            notified: NotifiedSet::default(),
            last_poll_at: None,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        SubscriptionId::new(self.scope.clone(), self.source_id.clone())
    }

    /// Scheduled delivery succeeded: record the item and advance the pointer.
    /// The pointer only moves forward in `published_at` order, never back.
    pub fn record_scheduled_delivery(&mut self, item: &Item, window: usize) {
        self.notified.insert(&item.item_id, item.published_at, window);
        let advances = match &self.last_seen {
            None => true,
            Some(p) => item.published_at >= p.published_at,
        };
        if advances {
            self.last_seen = Some(SeenPointer {
                item_id: item.item_id.clone(),
                published_at: item.published_at,
            });
        }
    }

    /// Backfill delivery succeeded: record the item without touching the
    /// scheduler's pointer.
    pub fn record_backfill_delivery(&mut self, item: &Item, window: usize) {
        self.notified.insert(&item.item_id, item.published_at, window);
    }

    /// Seed the pointer from a backfill's newest delivered item, but only if
    /// no scheduled poll has set it yet.
    pub fn adopt_pointer_if_empty(&mut self, item: &Item) {
        if self.last_seen.is_none() {
            self.last_seen = Some(SeenPointer {
                item_id: item.item_id.clone(),
                published_at: item.published_at,
            });
        }
    }

    pub fn mark_polled(&mut self, at: DateTime<Utc>) {
        self.last_poll_at = Some(at);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct NotifiedEntry {
    item_id: String,
    published_at: DateTime<Utc>,
}

/// Bounded record of item ids already delivered through any path.
///
/// Membership is exact for the most recent `window` entries. Evicting an
/// entry raises the watermark instead of forgetting it, so anything published
/// at or before the watermark still counts as already notified. De-duplication
/// stays exact inside the window and conservative beyond it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifiedSet {
    entries: VecDeque<NotifiedEntry>,
    watermark: Option<DateTime<Utc>>,
}

impl NotifiedSet {
    pub fn contains(&self, item_id: &str, published_at: DateTime<Utc>) -> bool {
        if self.entries.iter().any(|e| e.item_id == item_id) {
            return true;
        }
        matches!(self.watermark, Some(w) if published_at <= w)
    }

    /// Insert an id; a second insert of the same id is a no-op.
    pub fn insert(&mut self, item_id: &str, published_at: DateTime<Utc>, window: usize) {
        if self.entries.iter().any(|e| e.item_id == item_id) {
            return;
        }
        self.entries.push_back(NotifiedEntry {
            item_id: item_id.to_string(),
            published_at,
        });
        let cap = window.max(1);
        while self.entries.len() > cap {
            if let Some(evicted) = self.entries.pop_front() {
                self.watermark = Some(match self.watermark {
                    Some(w) => w.max(evicted.published_at),
                    None => evicted.published_at,
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }
}
