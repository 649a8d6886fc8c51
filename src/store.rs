//! Durable subscription store.
//!
//! The record set lives in memory behind one async mutex and is persisted as
//! a JSON file. All writes funnel through the lock: a state transition is
//! applied to a copy, the full record set is written to disk (temp file +
//! rename), and only then is the copy committed and the lock released. A
//! failed write surfaces [`WatchError::Storage`] and leaves both the durable
//! file and the in-memory state as they were, so concurrent writers always
//! compose against the current state rather than a stale snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::WatchError;
use crate::subscription::{Subscription, SubscriptionId};
use crate::Result;

pub struct SubscriptionStore {
    path: Option<PathBuf>,
    state: Mutex<BTreeMap<String, Subscription>>,
}

impl SubscriptionStore {
    /// Open a store backed by `path`, loading existing records if the file
    /// is present.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = match fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s).map_err(|e| {
                WatchError::Storage(format!("parsing {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(WatchError::Storage(format!(
                    "reading {}: {e}",
                    path.display()
                )))
            }
        };
        debug!(path = %path.display(), records = map.len(), "subscription store opened");
        Ok(Self {
            path: Some(path),
            state: Mutex::new(map),
        })
    }

    /// Store without a backing file. Used by tests and by callers that manage
    /// persistence elsewhere.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create or update the subscription for (scope, source).
    ///
    /// Resubscribing an existing pair updates the destination and preserves
    /// all de-duplication state, so `upsert` is idempotent per pair.
    pub async fn upsert(
        &self,
        scope: &str,
        source_id: &str,
        destination_id: &str,
    ) -> Result<SubscriptionId> {
        let id = SubscriptionId::new(scope, source_id);
        let key = id.key();
        let mut map = self.state.lock().await;

        let record = match map.get(&key) {
            Some(existing) => {
                let mut updated = existing.clone();
                updated.destination_id = destination_id.to_string();
                updated
            }
            None => Subscription::new(scope, source_id, destination_id),
        };

        self.commit(&mut map, key, Some(record)).await?;
        Ok(id)
    }

    pub async fn get(&self, id: &SubscriptionId) -> Result<Subscription> {
        let map = self.state.lock().await;
        map.get(&id.key())
            .cloned()
            .ok_or_else(|| WatchError::NotFound(format!("subscription {id}")))
    }

    /// All subscriptions, in stable key order.
    pub async fn list_all(&self) -> Vec<Subscription> {
        let map = self.state.lock().await;
        map.values().cloned().collect()
    }

    pub async fn list_scope(&self, scope: &str) -> Vec<Subscription> {
        let map = self.state.lock().await;
        map.values()
            .filter(|s| s.scope == scope)
            .cloned()
            .collect()
    }

    pub async fn delete(&self, scope: &str, source_id: &str) -> Result<()> {
        let id = SubscriptionId::new(scope, source_id);
        let key = id.key();
        let mut map = self.state.lock().await;
        if !map.contains_key(&key) {
            return Err(WatchError::NotFound(format!("subscription {id}")));
        }
        self.commit(&mut map, key, None).await
    }

    /// Delete every subscription in `scope`; returns how many were removed.
    pub async fn delete_scope(&self, scope: &str) -> Result<usize> {
        let mut map = self.state.lock().await;
        let keys: Vec<String> = map
            .iter()
            .filter(|(_, s)| s.scope == scope)
            .map(|(k, _)| k.clone())
            .collect();
        if keys.is_empty() {
            return Ok(0);
        }

        let mut removed = Vec::with_capacity(keys.len());
        for k in &keys {
            if let Some(s) = map.remove(k) {
                removed.push((k.clone(), s));
            }
        }
        if let Err(e) = self.persist(&map).await {
            for (k, s) in removed {
                map.insert(k, s);
            }
            return Err(e);
        }
        Ok(keys.len())
    }

    /// Apply a pure state transition to one subscription and persist the
    /// result before releasing the store lock. This is the only way any
    /// component changes stored subscription state.
    pub async fn mutate<T, F>(&self, id: &SubscriptionId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Subscription) -> T,
    {
        let key = id.key();
        let mut map = self.state.lock().await;
        let mut record = map
            .get(&key)
            .cloned()
            .ok_or_else(|| WatchError::NotFound(format!("subscription {id}")))?;
        let out = f(&mut record);
        self.commit(&mut map, key, Some(record)).await?;
        Ok(out)
    }

    /// Swap one record in (or out, with `None`), persisting before the
    /// in-memory change becomes visible. Rolls back on write failure.
    async fn commit(
        &self,
        map: &mut BTreeMap<String, Subscription>,
        key: String,
        record: Option<Subscription>,
    ) -> Result<()> {
        let prev = match record {
            Some(r) => map.insert(key.clone(), r),
            None => map.remove(&key),
        };
        if let Err(e) = self.persist(map).await {
            match prev {
                Some(p) => {
                    map.insert(key, p);
                }
                None => {
                    map.remove(&key);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    async fn persist(&self, map: &BTreeMap<String, Subscription>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_state(path, map).await
    }
}

async fn write_state(path: &Path, map: &BTreeMap<String, Subscription>) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| WatchError::Storage(format!("state dir {}: {e}", dir.display())))?;
        }
    }
    let bytes = serde_json::to_vec_pretty(map)
        .map_err(|e| WatchError::Storage(format!("encoding state: {e}")))?;

    // temp file + rename keeps the previous state intact on a failed write
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes)
        .await
        .map_err(|e| WatchError::Storage(format!("writing {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| WatchError::Storage(format!("renaming {}: {e}", path.display())))?;
    Ok(())
}
