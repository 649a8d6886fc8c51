use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{FetchedItem, SourceClient};
use crate::error::WatchError;
use crate::Result;

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";

/// Source client backed by the YouTube Data API v3 `search` endpoint
/// (`order=date` over one channel). The `source_id` is the channel id.
pub struct YouTubeClient {
    api_key: String,
    client: Client,
    timeout: Duration,
}

impl YouTubeClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var("YOUTUBE_API_KEY")
            .map_err(|_| WatchError::Config("YOUTUBE_API_KEY is required".to_string()))?;
        Ok(Self::new(key))
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn parse_response(body: &str) -> Result<Vec<FetchedItem>> {
        let resp: SearchResponse = serde_json::from_str(body)
            .map_err(|e| WatchError::SourceUnavailable(format!("youtube response parse: {e}")))?;

        let mut out = Vec::with_capacity(resp.items.len());
        for it in resp.items {
            let url = it
                .id
                .video_id
                .as_deref()
                .map(|v| format!("https://www.youtube.com/watch?v={v}"));
            out.push(FetchedItem {
                item_id: it.id.video_id,
                title: it.snippet.title.unwrap_or_default(),
                published_at: it
                    .snippet
                    .published_at
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                url,
                live_hint: it
                    .snippet
                    .live_broadcast_content
                    .as_deref()
                    .map(|s| s.eq_ignore_ascii_case("live")),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceClient for YouTubeClient {
    async fn fetch_recent(&self, source_id: &str, limit: usize) -> Result<Vec<FetchedItem>> {
        let max_results = limit.max(1).to_string();
        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("key", self.api_key.as_str()),
                ("channelId", source_id),
                ("part", "snippet,id"),
                ("order", "date"),
                ("maxResults", max_results.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| WatchError::SourceUnavailable(format!("youtube request: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| WatchError::SourceUnavailable(format!("youtube body: {e}")))?;

        // 403 from the Data API is the quota/key signal
        if status == StatusCode::FORBIDDEN {
            return Err(WatchError::SourceQuotaExceeded(format!(
                "youtube returned 403 for channel {source_id}"
            )));
        }
        if !status.is_success() {
            return Err(WatchError::SourceUnavailable(format!(
                "youtube returned {status} for channel {source_id}"
            )));
        }

        Self::parse_response(&body)
    }

    fn name(&self) -> &'static str {
        "youtube"
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<DateTime<Utc>>,
    #[serde(rename = "liveBroadcastContent")]
    live_broadcast_content: Option<String>,
}
