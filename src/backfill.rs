//! On-demand historical replay.
//!
//! Backfill fetches a page of recent items, sorts them oldest-first, and
//! delivers everything not already notified, appending to the notified set
//! per item as it goes. It never moves the scheduler's pointer unless the
//! pointer was empty, in which case it adopts the newest delivered item so
//! the next scheduled cycle does not re-deliver the tail. Dropping the
//! future mid-stream keeps everything committed so far; a later run skips
//! those items as already notified.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use metrics::counter;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::classify::{self, Novelty};
use crate::config::WatchConfig;
use crate::error::WatchError;
use crate::notify::Notifier;
use crate::scheduler::ensure_metrics_described;
use crate::source::{Item, SourceClient};
use crate::store::SubscriptionStore;
use crate::subscription::SubscriptionId;
use crate::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct BackfillEngine {
    store: Arc<SubscriptionStore>,
    source: Arc<dyn SourceClient>,
    notifier: Arc<dyn Notifier>,
    cfg: WatchConfig,
    in_flight: Mutex<HashSet<String>>,
}

impl BackfillEngine {
    pub fn new(
        store: Arc<SubscriptionStore>,
        source: Arc<dyn SourceClient>,
        notifier: Arc<dyn Notifier>,
        cfg: WatchConfig,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
            cfg,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Replay up to `max_items` historical items, oldest first.
    ///
    /// A second invocation for the same subscription while one is running is
    /// rejected with [`WatchError::BackfillInProgress`]; backfills for
    /// different subscriptions run concurrently.
    pub async fn backfill(
        &self,
        id: &SubscriptionId,
        max_items: usize,
    ) -> Result<BackfillReport> {
        ensure_metrics_described();
        let _guard = self.claim(id)?;
        let sub = self.store.get(id).await?;

        let fetched = match timeout(
            self.cfg.fetch_timeout,
            self.source.fetch_recent(&sub.source_id, max_items.max(1)),
        )
        .await
        {
            Ok(res) => res?,
            Err(_) => {
                return Err(WatchError::SourceUnavailable(format!(
                    "backfill fetch timed out after {:?}",
                    self.cfg.fetch_timeout
                )))
            }
        };

        // chronological narrative order for the destination
        let mut items: Vec<Item> = fetched
            .into_iter()
            .filter_map(|raw| classify::resolve(raw, &self.cfg.live_markers))
            .collect();
        items.sort_by_key(|i| i.published_at);

        let mut report = BackfillReport::default();
        let mut newest_delivered: Option<Item> = None;

        for item in items {
            // re-read per item so concurrent deliveries (a scheduled cycle,
            // another path) are visible before we classify
            let sub = self.store.get(id).await?;
            if classify::classify_replay(&sub, &item) == Novelty::AlreadyNotified {
                report.skipped += 1;
                continue;
            }

            let delivery = timeout(
                self.cfg.deliver_timeout,
                self.notifier.deliver(&sub.destination_id, &item),
            )
            .await;
            match delivery {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(subscription = %id, item = %item.item_id, error = %e, "backfill delivery failed, continuing");
                    continue;
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(subscription = %id, item = %item.item_id, "backfill delivery timed out, continuing");
                    continue;
                }
            }

            let window = self.cfg.notified_window;
            let recorded = item.clone();
            self.store
                .mutate(id, move |s| s.record_backfill_delivery(&recorded, window))
                .await?;
            counter!("watch_notifications_total").increment(1);
            report.delivered += 1;
            // items ascend, so the last delivered one is the newest
            newest_delivered = Some(item);
        }

        if let Some(newest) = newest_delivered {
            self.store
                .mutate(id, move |s| s.adopt_pointer_if_empty(&newest))
                .await?;
        }

        counter!("watch_backfill_runs_total").increment(1);
        info!(
            subscription = %id,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "backfill complete"
        );
        Ok(report)
    }

    fn claim(&self, id: &SubscriptionId) -> Result<InFlightGuard<'_>> {
        let key = id.key();
        let mut set = self.in_flight.lock().expect("backfill in-flight set poisoned");
        if !set.insert(key.clone()) {
            return Err(WatchError::BackfillInProgress(key));
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            key,
        })
    }
}

/// Releases the per-subscription claim on every exit path.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .expect("backfill in-flight set poisoned")
            .remove(&self.key);
    }
}
