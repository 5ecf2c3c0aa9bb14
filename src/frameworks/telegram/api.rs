// file: src/frameworks/telegram/api.rs
// description: telegram bot api client over reqwest, behind the BotApi trait
// reference: https://core.telegram.org/bots/api#making-requests

use crate::config::TelegramConfig;
use crate::error::{RagError, Result};
use crate::frameworks::telegram::types::{
    ApiResponse, InlineKeyboardMarkup, MediaPhoto, ParseMode, Update, User,
};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Extra time on top of the long-poll timeout before the HTTP request gives up.
const POLL_GRACE_SECS: u64 = 15;
const MEDIA_GROUP_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait BotApi: Send + Sync {
    async fn get_me(&self) -> Result<User>;

    async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<()>;

    async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>>;

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<()>;

    async fn send_media_group(&self, chat_id: i64, photos: &[MediaPhoto]) -> Result<()>;

    async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<()>;

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()>;

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<()>;
}

pub struct TelegramClient {
    http: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let token = config.require_token()?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + POLL_GRACE_SECS))
            .build()
            .map_err(|e| RagError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: format!("{}/bot{}", config.api_base_url.trim_end_matches('/'), token),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, payload: Value) -> Result<T> {
        debug!("Telegram {}", method);
        let response = self
            .http
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await?;
        Self::unwrap_response(method, response).await
    }

    async fn unwrap_response<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body: ApiResponse<T> = response.json().await.map_err(|e| {
            RagError::Telegram(format!("{} returned unreadable body ({}): {}", method, status, e))
        })?;

        match (body.ok, body.result) {
            (true, Some(result)) => Ok(result),
            _ => {
                let mut message = format!(
                    "{} failed: {}",
                    method,
                    body.description
                        .unwrap_or_else(|| format!("HTTP {}", status))
                );
                if let Some(retry_after) = body.parameters.and_then(|p| p.retry_after) {
                    message.push_str(&format!(" (retry after {}s)", retry_after));
                }
                Err(RagError::Telegram(message))
            }
        }
    }
}

/// `sendMessage` payload; markup and parse mode are omitted when absent.
pub fn message_payload(
    chat_id: i64,
    text: &str,
    parse_mode: Option<ParseMode>,
    reply_markup: Option<&InlineKeyboardMarkup>,
) -> Value {
    let mut payload = json!({"chat_id": chat_id, "text": text});
    if let Some(parse_mode) = parse_mode {
        payload["parse_mode"] = json!(parse_mode);
    }
    if let Some(markup) = reply_markup {
        payload["reply_markup"] = json!(markup);
    }
    payload
}

/// `media` field of `sendMediaGroup`, pointing at `photo{i}` attachments.
pub fn media_group_descriptor(photos: &[MediaPhoto]) -> Value {
    Value::Array(
        photos
            .iter()
            .enumerate()
            .map(|(i, photo)| {
                let mut media = json!({"type": "photo", "media": format!("attach://photo{}", i)});
                if let Some(caption) = photo.caption.as_ref() {
                    media["caption"] = json!(caption);
                }
                if let Some(parse_mode) = photo.parse_mode {
                    media["parse_mode"] = json!(parse_mode);
                }
                media
            })
            .collect(),
    )
}

#[async_trait]
impl BotApi for TelegramClient {
    async fn get_me(&self) -> Result<User> {
        self.call("getMe", json!({})).await
    }

    async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<()> {
        self.call::<bool>(
            "deleteWebhook",
            json!({"drop_pending_updates": drop_pending_updates}),
        )
        .await
        .map(|_| ())
    }

    async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let mut payload = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"]
        });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }
        self.call("getUpdates", payload).await
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<()> {
        self.call::<Value>(
            "sendMessage",
            message_payload(chat_id, text, parse_mode, reply_markup),
        )
        .await
        .map(|_| ())
    }

    async fn send_media_group(&self, chat_id: i64, photos: &[MediaPhoto]) -> Result<()> {
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("media", media_group_descriptor(photos).to_string());

        for (i, photo) in photos.iter().enumerate() {
            let part = Part::bytes(photo.bytes.clone())
                .file_name(format!("image_{}.jpg", i))
                .mime_str("image/jpeg")?;
            form = form.part(format!("photo{}", i), part);
        }

        let response = self
            .http
            .post(self.method_url("sendMediaGroup"))
            .timeout(MEDIA_GROUP_TIMEOUT)
            .multipart(form)
            .send()
            .await?;
        Self::unwrap_response::<Value>("sendMediaGroup", response)
            .await
            .map(|_| ())
    }

    async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<()> {
        self.call::<bool>(
            "sendChatAction",
            json!({"chat_id": chat_id, "action": action}),
        )
        .await
        .map(|_| ())
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        self.call::<bool>(
            "answerCallbackQuery",
            json!({"callback_query_id": callback_query_id}),
        )
        .await
        .map(|_| ())
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<()> {
        let mut payload = message_payload(chat_id, text, parse_mode, None);
        payload["message_id"] = json!(message_id);
        self.call::<Value>("editMessageText", payload)
            .await
            .map(|_| ())
    }
}
