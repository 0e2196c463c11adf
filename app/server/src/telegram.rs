//! Telegram Bot API: webhook update types, outbound client and reply formatting

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use hybrid_qa::FinalAnswer;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Incoming webhook payload. Only the fields the bot reads are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub from: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// A question the bot should answer, taken from an update.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingQuestion {
    pub chat_id: i64,
    pub text: String,
}

/// Text messages only; bot commands and non-text updates are ignored.
pub fn extract_question(update: &Update) -> Option<IncomingQuestion> {
    let message = update.message.as_ref()?;
    let text = message.text.as_deref()?.trim();
    if text.is_empty() || text.starts_with('/') {
        return None;
    }
    Some(IncomingQuestion {
        chat_id: message.chat.id,
        text: text.to_string(),
    })
}

pub fn format_reply(answer: &FinalAnswer) -> String {
    format!("🔎 *Route*: `{}`\n\n{}", answer.route, answer.answer)
}

pub const APOLOGY_REPLY: &str = "Sorry, I couldn't answer that question right now. Please try again later.";

/// Outbound side of the chat bot.
#[async_trait]
pub trait ChatReplier: Send + Sync {
    async fn send_markdown(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Same text with no markup parsing; used when Markdown is rejected.
    async fn send_plain(&self, chat_id: i64, text: &str) -> Result<()>;
}

pub struct TelegramClient {
    api_base: String,
    token: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>, api_base: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self {
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            token: token.into(),
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Telegram {} request failed", method))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .with_context(|| format!("Telegram {} returned a non-JSON body", method))?;

        if !status.is_success() || payload.get("ok") != Some(&Value::Bool(true)) {
            let description = payload
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(anyhow!("Telegram {} failed ({}): {}", method, status, description));
        }
        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<()> {
        self.call(
            "deleteWebhook",
            json!({ "drop_pending_updates": drop_pending_updates }),
        )
        .await?;
        Ok(())
    }

    pub async fn set_webhook(&self, url: &str) -> Result<()> {
        self.call("setWebhook", json!({ "url": url })).await?;
        Ok(())
    }

    /// Drop stale updates, then point Telegram at `url`. Failures are logged only.
    pub async fn configure_webhook(&self, url: &str) {
        let result = async {
            self.delete_webhook(true).await?;
            self.set_webhook(url).await
        }
        .await;

        match result {
            Ok(()) => tracing::info!(url = %url, "Telegram webhook set"),
            Err(e) => tracing::warn!(error = %e, "Telegram webhook setup failed"),
        }
    }
}

#[async_trait]
impl ChatReplier for TelegramClient {
    async fn send_markdown(&self, chat_id: i64, text: &str) -> Result<()> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
            }),
        )
        .await?;
        Ok(())
    }

    async fn send_plain(&self, chat_id: i64, text: &str) -> Result<()> {
        self.call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(())
    }
}

/// Send `text` as Markdown, falling back to plain text if Telegram rejects the markup.
pub async fn deliver_reply(replier: &dyn ChatReplier, chat_id: i64, text: &str) -> Result<()> {
    match replier.send_markdown(chat_id, text).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::warn!(error = %e, chat_id = chat_id, "Markdown reply rejected, resending as plain text");
            replier.send_plain(chat_id, text).await
        }
    }
}
