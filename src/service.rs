//! Command-layer entry points.
//!
//! Thin façade over the store, the scheduler and the backfill engine. All
//! user-facing argument validation and privilege checks (notably for the
//! destructive `reset`) belong to the caller, not here.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::backfill::{BackfillEngine, BackfillReport};
use crate::config::WatchConfig;
use crate::notify::Notifier;
use crate::scheduler::{CheckOutcome, PollScheduler};
use crate::source::SourceClient;
use crate::store::SubscriptionStore;
use crate::subscription::{Subscription, SubscriptionId};
use crate::Result;

pub struct WatchService {
    store: Arc<SubscriptionStore>,
    scheduler: PollScheduler,
    backfill: BackfillEngine,
}

impl WatchService {
    pub fn new(
        store: Arc<SubscriptionStore>,
        source: Arc<dyn SourceClient>,
        notifier: Arc<dyn Notifier>,
        cfg: WatchConfig,
    ) -> Self {
        let scheduler = PollScheduler::new(
            store.clone(),
            source.clone(),
            notifier.clone(),
            cfg.clone(),
        );
        let backfill = BackfillEngine::new(store.clone(), source, notifier, cfg);
        Self {
            store,
            scheduler,
            backfill,
        }
    }

    pub fn store(&self) -> &Arc<SubscriptionStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    /// Start the background poll loop.
    pub fn spawn_scheduler(&self) -> JoinHandle<()> {
        self.scheduler.spawn()
    }

    pub async fn subscribe(
        &self,
        scope: &str,
        source_id: &str,
        destination_id: &str,
    ) -> Result<SubscriptionId> {
        let id = self.store.upsert(scope, source_id, destination_id).await?;
        info!(subscription = %id, destination = destination_id, "subscribed");
        Ok(id)
    }

    pub async fn unsubscribe(&self, scope: &str, source_id: &str) -> Result<()> {
        self.store.delete(scope, source_id).await?;
        info!(scope, source = source_id, "unsubscribed");
        Ok(())
    }

    pub async fn subscriptions(&self, scope: &str) -> Vec<Subscription> {
        self.store.list_scope(scope).await
    }

    /// One synchronous check of a single subscription, outside the timer.
    pub async fn force_check(&self, id: &SubscriptionId) -> Result<CheckOutcome> {
        self.scheduler.check_subscription(id).await
    }

    pub async fn backfill(&self, id: &SubscriptionId, max_items: usize) -> Result<BackfillReport> {
        self.backfill.backfill(id, max_items).await
    }

    /// Delete every subscription in `scope`. Destructive; the caller is
    /// expected to have checked privileges.
    pub async fn reset(&self, scope: &str) -> Result<usize> {
        let removed = self.store.delete_scope(scope).await?;
        info!(scope, removed, "scope reset");
        Ok(removed)
    }
}
