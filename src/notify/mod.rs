//! Outbound messages to bot users.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Pushes a text message to one user of the bot.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), AppError>;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends through the Telegram Bot API.
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramNotifier {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), AppError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);

        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: user_id,
                text,
            })
            .send()
            .await?;

        let status = response.status();
        let reply: TelegramReply = response.json().await?;
        if !reply.ok {
            let reason = reply.description.unwrap_or_else(|| status.to_string());
            return Err(AppError::UpstreamUnavailable(format!(
                "Telegram rejected message to {}: {}",
                user_id, reason
            )));
        }

        tracing::debug!("Sent message to {}", user_id);
        Ok(())
    }
}

/// Writes messages to the log instead of sending them. Used when no bot token is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), AppError> {
        tracing::info!("Message to {}: {}", user_id, text);
        Ok(())
    }
}
