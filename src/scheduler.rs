//! Timer-driven poll scheduler.
//!
//! Each cycle walks every subscription in stable order, fetches the single
//! most recent item, classifies it, and notifies + advances dedup state only
//! when delivery succeeds. One subscription's failure never aborts the cycle
//! for the others. A cycle that is still running when the next tick lands
//! causes that tick to be skipped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::classify::{self, Novelty};
use crate::config::WatchConfig;
use crate::error::WatchError;
use crate::notify::Notifier;
use crate::source::{Item, SourceClient};
use crate::store::SubscriptionStore;
use crate::subscription::SubscriptionId;
use crate::Result;

/// One-time metrics registration (so series show up on whatever exporter the
/// embedding process installs).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("watch_cycles_total", "Completed poll cycles.");
        describe_counter!(
            "watch_cycles_skipped_total",
            "Timer ticks skipped because a cycle was still running."
        );
        describe_counter!(
            "watch_fetch_errors_total",
            "Source fetch failures, skipped and retried next cycle."
        );
        describe_counter!(
            "watch_delivery_failures_total",
            "Notifier failures; dedup state was not advanced."
        );
        describe_counter!("watch_notifications_total", "Items delivered to a notifier.");
        describe_counter!("watch_backfill_runs_total", "Completed backfill runs.");
        describe_gauge!("watch_last_cycle_ts", "Unix ts when the last poll cycle ran.");
    });
}

/// What happened for a single subscription during one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The source returned nothing.
    NoItem,
    /// The source returned only items with no resolvable id.
    Unresolved,
    AlreadyNotified,
    Delivered(Item),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub checked: usize,
    pub delivered: usize,
    pub fetch_errors: usize,
    pub delivery_failures: usize,
}

#[derive(Clone)]
pub struct PollScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<SubscriptionStore>,
    source: Arc<dyn SourceClient>,
    notifier: Arc<dyn Notifier>,
    cfg: WatchConfig,
    running: AtomicBool,
}

impl PollScheduler {
    pub fn new(
        store: Arc<SubscriptionStore>,
        source: Arc<dyn SourceClient>,
        notifier: Arc<dyn Notifier>,
        cfg: WatchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                source,
                notifier,
                cfg,
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the timer loop. Ticks fire on a fixed grid relative to start,
    /// so a slow cycle skips ticks instead of compounding delay.
    pub fn spawn(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        let period = scheduler.inner.cfg.poll_interval;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Some(summary) = scheduler.run_cycle().await {
                    debug!(
                        checked = summary.checked,
                        delivered = summary.delivered,
                        fetch_errors = summary.fetch_errors,
                        delivery_failures = summary.delivery_failures,
                        "poll cycle complete"
                    );
                }
            }
        })
    }

    /// Run one full cycle over all subscriptions. Returns `None` when a
    /// cycle is already in flight (re-entrancy guard).
    pub async fn run_cycle(&self) -> Option<CycleSummary> {
        ensure_metrics_described();
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("poll cycle still running, skipping tick");
            counter!("watch_cycles_skipped_total").increment(1);
            return None;
        }
        let summary = self.cycle_inner().await;
        self.inner.running.store(false, Ordering::SeqCst);
        Some(summary)
    }

    async fn cycle_inner(&self) -> CycleSummary {
        let subs = self.inner.store.list_all().await;
        let mut summary = CycleSummary::default();

        for sub in subs {
            let id = sub.id();
            summary.checked += 1;
            match self.check_subscription(&id).await {
                Ok(CheckOutcome::Delivered(item)) => {
                    summary.delivered += 1;
                    info!(
                        subscription = %id,
                        item = %item.item_id,
                        kind = ?item.kind,
                        "notified new item"
                    );
                }
                Ok(_) => {}
                Err(WatchError::Delivery(reason)) => {
                    summary.delivery_failures += 1;
                    counter!("watch_delivery_failures_total").increment(1);
                    warn!(
                        subscription = %id,
                        %reason,
                        "delivery failed, will retry next cycle"
                    );
                }
                Err(e) => {
                    summary.fetch_errors += 1;
                    counter!("watch_fetch_errors_total").increment(1);
                    warn!(subscription = %id, error = %e, "subscription check failed");
                }
            }
        }

        counter!("watch_cycles_total").increment(1);
        gauge!("watch_last_cycle_ts").set(Utc::now().timestamp() as f64);
        summary
    }

    /// One ad-hoc check of a single subscription; backs `force_check`.
    ///
    /// Dedup state advances only after delivery succeeds, so a failed
    /// delivery is retried on the next cycle with the same item.
    pub async fn check_subscription(&self, id: &SubscriptionId) -> Result<CheckOutcome> {
        ensure_metrics_described();
        let sub = self.inner.store.get(id).await?;

        let fetched = match timeout(
            self.inner.cfg.fetch_timeout,
            self.inner.source.fetch_recent(&sub.source_id, 1),
        )
        .await
        {
            Ok(res) => res,
            Err(_) => Err(WatchError::SourceUnavailable(format!(
                "fetch timed out after {:?}",
                self.inner.cfg.fetch_timeout
            ))),
        };

        // Record the poll attempt whether or not the fetch succeeded.
        let polled_at = Utc::now();
        self.inner
            .store
            .mutate(id, move |s| s.mark_polled(polled_at))
            .await?;
        let items = fetched?;

        let Some(raw) = items.into_iter().next() else {
            return Ok(CheckOutcome::NoItem);
        };
        let Some(item) = classify::resolve(raw, &self.inner.cfg.live_markers) else {
            return Ok(CheckOutcome::Unresolved);
        };

        // Classify against the freshest stored state, not the snapshot from
        // before the fetch.
        let sub = self.inner.store.get(id).await?;
        if classify::classify_latest(&sub, &item) == Novelty::AlreadyNotified {
            return Ok(CheckOutcome::AlreadyNotified);
        }

        match timeout(
            self.inner.cfg.deliver_timeout,
            self.inner.notifier.deliver(&sub.destination_id, &item),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(WatchError::Delivery(format!(
                    "delivery timed out after {:?}",
                    self.inner.cfg.deliver_timeout
                )))
            }
        }

        let window = self.inner.cfg.notified_window;
        let recorded = item.clone();
        self.inner
            .store
            .mutate(id, move |s| s.record_scheduled_delivery(&recorded, window))
            .await?;
        counter!("watch_notifications_total").increment(1);
        Ok(CheckOutcome::Delivered(item))
    }
}
