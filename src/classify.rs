//! # Novelty Classifier
//! Pure, testable logic that maps a fetched item plus stored subscription
//! state to "new" or "already notified". No I/O.
//!
//! Live detection policy: a structured live flag from the source is
//! authoritative when present; otherwise we fall back to a case-insensitive
//! substring match against the configured live markers. The title match is a
//! heuristic and is isolated here so a stronger signal can replace it without
//! touching scheduling or dedup logic.

use crate::source::{FetchedItem, Item, ItemKind};
use crate::subscription::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Novelty {
    New,
    AlreadyNotified,
}

/// Resolve a raw fetched item into a classifiable [`Item`].
///
/// Items with no resolvable id are dropped here and never recorded as seen.
pub fn resolve(raw: FetchedItem, live_markers: &[String]) -> Option<Item> {
    let item_id = raw.item_id.filter(|id| !id.trim().is_empty())?;
    let kind = kind_of(&raw.title, raw.live_hint, live_markers);
    Some(Item {
        item_id,
        title: raw.title,
        published_at: raw.published_at,
        url: raw.url,
        kind,
    })
}

/// Derive the item kind. The structured hint wins; the title heuristic is
/// fallback only.
pub fn kind_of(title: &str, live_hint: Option<bool>, live_markers: &[String]) -> ItemKind {
    if let Some(live) = live_hint {
        return if live { ItemKind::Live } else { ItemKind::Upload };
    }
    let lowered = title.to_lowercase();
    let marked = live_markers
        .iter()
        .filter(|m| !m.is_empty())
        .any(|m| lowered.contains(&m.to_lowercase()));
    if marked {
        ItemKind::Live
    } else {
        ItemKind::Upload
    }
}

/// Scheduler mode: classify the single most recent item against the
/// subscription's pointer and notified set.
pub fn classify_latest(sub: &Subscription, item: &Item) -> Novelty {
    if let Some(p) = &sub.last_seen {
        if p.item_id == item.item_id {
            return Novelty::AlreadyNotified;
        }
    }
    if sub.notified.contains(&item.item_id, item.published_at) {
        return Novelty::AlreadyNotified;
    }
    Novelty::New
}

/// Backfill mode: classify against the notified set alone, since backfill's
/// purpose is exhaustive catch-up independent of the scheduler's pointer.
pub fn classify_replay(sub: &Subscription, item: &Item) -> Novelty {
    if sub.notified.contains(&item.item_id, item.published_at) {
        return Novelty::AlreadyNotified;
    }
    Novelty::New
}
