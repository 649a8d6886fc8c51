// Shared test doubles: a scripted source and a recording notifier.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use channel_update_notifier::{
    FetchedItem, Item, ItemKind, Notifier, Result, SourceClient, WatchError,
};

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn upload(id: &str, secs: i64) -> FetchedItem {
    FetchedItem {
        item_id: Some(id.to_string()),
        title: format!("video {id}"),
        published_at: ts(secs),
        url: Some(format!("https://example.test/watch/{id}")),
        live_hint: Some(false),
    }
}

pub fn unresolvable(secs: i64) -> FetchedItem {
    FetchedItem {
        item_id: None,
        title: "channel hit without a video id".to_string(),
        published_at: ts(secs),
        url: None,
        live_hint: None,
    }
}

pub fn resolved(id: &str, secs: i64) -> Item {
    Item {
        item_id: id.to_string(),
        title: format!("video {id}"),
        published_at: ts(secs),
        url: None,
        kind: ItemKind::Upload,
    }
}

/// Source whose responses are scripted per source id. Each fetch consumes one
/// step; an exhausted script returns an empty page.
#[derive(Default)]
pub struct ScriptedSource {
    steps: Mutex<HashMap<String, VecDeque<Result<Vec<FetchedItem>>>>>,
    delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(ms: u64) -> Self {
        Self {
            steps: Mutex::new(HashMap::new()),
            delay: Some(Duration::from_millis(ms)),
        }
    }

    pub fn push_ok(&self, source_id: &str, items: Vec<FetchedItem>) {
        self.steps
            .lock()
            .unwrap()
            .entry(source_id.to_string())
            .or_default()
            .push_back(Ok(items));
    }

    pub fn push_err(&self, source_id: &str, err: WatchError) {
        self.steps
            .lock()
            .unwrap()
            .entry(source_id.to_string())
            .or_default()
            .push_back(Err(err));
    }
}

#[async_trait::async_trait]
impl SourceClient for ScriptedSource {
    async fn fetch_recent(&self, source_id: &str, _limit: usize) -> Result<Vec<FetchedItem>> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let step = self
            .steps
            .lock()
            .unwrap()
            .get_mut(source_id)
            .and_then(|q| q.pop_front());
        step.unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Notifier that records every delivery and can be told to fail the next N.
#[derive(Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<(String, Item)>>,
    fail_next: AtomicUsize,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(ms: u64) -> Self {
        Self {
            delay: Some(Duration::from_millis(ms)),
            ..Self::default()
        }
    }

    pub fn fail_times(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn deliveries(&self) -> Vec<(String, Item)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_ids(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, item)| item.item_id.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, destination_id: &str, item: &Item) -> Result<()> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.fail_next.load(Ordering::SeqCst) > 0 {
            self.fail_next.fetch_sub(1, Ordering::SeqCst);
            return Err(WatchError::Delivery("scripted failure".to_string()));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((destination_id.to_string(), item.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
