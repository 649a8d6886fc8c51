use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use super::Notifier;
use crate::error::WatchError;
use crate::source::{Item, ItemKind};
use crate::Result;

const API_BASE: &str = "https://discord.com/api/v10";

/// Notifier that posts messages to a Discord channel (the destination id)
/// through the REST API with a bot token.
#[derive(Clone)]
pub struct DiscordNotifier {
    bot_token: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn from_env() -> Result<Self> {
        let token = std::env::var("DISCORD_BOT_TOKEN")
            .map_err(|_| WatchError::Config("DISCORD_BOT_TOKEN is required".to_string()))?;
        Ok(Self::new(token))
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    async fn post_message(&self, channel_id: &str, content: &str) -> Result<()> {
        let url = format!("{API_BASE}/channels/{channel_id}/messages");
        let payload = MessagePayload { content };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&url)
                .header("Authorization", format!("Bot {}", self.bot_token))
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(WatchError::Delivery(format!(
                            "discord HTTP error for channel {channel_id}: {e}"
                        )));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(WatchError::Delivery(format!(
                        "discord request failed: {e}"
                    )));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn deliver(&self, destination_id: &str, item: &Item) -> Result<()> {
        self.post_message(destination_id, &render(item)).await
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

fn render(item: &Item) -> String {
    let headline = match item.kind {
        ItemKind::Live => "🔴 Live now",
        ItemKind::Upload => "📺 New upload",
    };
    let mut content = format!("{headline}: **{}**", item.title);
    if let Some(url) = &item.url {
        content.push('\n');
        content.push_str(url);
    }
    content
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    content: &'a str,
}
