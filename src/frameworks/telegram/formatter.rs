// file: src/frameworks/telegram/formatter.rs
// description: turns agent responses into telegram messages, media groups and source buttons
// reference: https://core.telegram.org/bots/api#sendmediagroup

use crate::config::TelegramConfig;
use crate::entities::DocumentPicture;
use crate::error::Result;
use crate::frameworks::telegram::api::BotApi;
use crate::frameworks::telegram::chunks::ChunkManager;
use crate::frameworks::telegram::markdown::{CONTINUATION_RESERVE, split_text, truncate_text};
use crate::frameworks::telegram::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, MediaPhoto, ParseMode,
};
use crate::usecases::agent::AgentResponse;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const SOURCES_HEADER: &str = "📚 *View Source Chunks:*";
pub const CONTINUED_PREFIX: &str = "📄 *Continued:*\n\n";
const BUTTONS_PER_ROW: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct MessageLimits {
    pub max_message_length: usize,
    pub max_caption_length: usize,
    pub max_media_group_size: usize,
}

impl From<&TelegramConfig> for MessageLimits {
    fn from(config: &TelegramConfig) -> Self {
        Self {
            max_message_length: config.max_message_length,
            max_caption_length: config.max_caption_length,
            max_media_group_size: config.max_media_group_size,
        }
    }
}

pub struct ResponseFormatter {
    api: Arc<dyn BotApi>,
    chunks: Arc<ChunkManager>,
    limits: MessageLimits,
    message_delay: Duration,
}

/// Raw bytes of a picture stored as a `data:image/...;base64,` URI.
pub fn decode_picture(picture: &DocumentPicture) -> Option<Vec<u8>> {
    let image = picture.image.as_ref().filter(|i| i.is_data_uri())?;
    let (_, payload) = image.uri.split_once(',')?;
    match STANDARD.decode(payload.trim()) {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        Ok(_) => None,
        Err(e) => {
            debug!("Skipping picture {}: {}", picture.picture_id, e);
            None
        }
    }
}

impl ResponseFormatter {
    pub fn new(
        api: Arc<dyn BotApi>,
        chunks: Arc<ChunkManager>,
        limits: MessageLimits,
        message_delay: Duration,
    ) -> Self {
        Self {
            api,
            chunks,
            limits,
            message_delay,
        }
    }

    /// Sends the answer with its pictures and source buttons.
    pub async fn send_response(
        &self,
        chat_id: i64,
        user_id: &str,
        response: &AgentResponse,
    ) -> Result<()> {
        let markup = self.source_buttons(user_id, response).await;

        if !response.pictures.is_empty() {
            match self
                .send_with_pictures(chat_id, response, markup.as_ref())
                .await
            {
                Ok(true) => return Ok(()),
                Ok(false) => debug!("No sendable pictures, falling back to text"),
                Err(e) => warn!("Media group failed, falling back to text: {}", e),
            }
        }

        self.send_text(chat_id, &response.content, markup.as_ref())
            .await
    }

    async fn source_buttons(
        &self,
        user_id: &str,
        response: &AgentResponse,
    ) -> Option<InlineKeyboardMarkup> {
        if response.chunk_ids_used.is_empty() || response.retrieved_chunks.is_empty() {
            return None;
        }

        let stored = self
            .chunks
            .store_chunks(user_id, &response.chunk_ids_used, &response.retrieved_chunks)
            .await;
        if stored.is_empty() {
            return None;
        }

        let buttons: Vec<InlineKeyboardButton> = stored
            .into_iter()
            .map(|(key, chunk_id)| InlineKeyboardButton {
                text: format!("📄 {}", chunk_id),
                callback_data: key,
            })
            .collect();

        Some(InlineKeyboardMarkup {
            inline_keyboard: buttons
                .chunks(BUTTONS_PER_ROW)
                .map(<[InlineKeyboardButton]>::to_vec)
                .collect(),
        })
    }

    /// `Ok(false)` when none of the pictures could be decoded. Only the first
    /// `max_media_group_size` pictures are considered. Once the group is
    /// delivered a failed follow-up message is logged, not returned.
    async fn send_with_pictures(
        &self,
        chat_id: i64,
        response: &AgentResponse,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<bool> {
        let mut photos: Vec<MediaPhoto> = response
            .pictures
            .iter()
            .take(self.limits.max_media_group_size)
            .filter_map(decode_picture)
            .map(|bytes| MediaPhoto {
                bytes,
                caption: None,
                parse_mode: None,
            })
            .collect();

        let Some(first) = photos.first_mut() else {
            return Ok(false);
        };

        let (caption, consumed) = truncate_text(&response.content, self.limits.max_caption_length);
        first.caption = Some(caption);
        first.parse_mode = Some(ParseMode::Markdown);

        self.api.send_media_group(chat_id, &photos).await?;

        let remainder: String = response.content.chars().skip(consumed).collect();
        let remainder = remainder.trim();
        let follow_up = if !remainder.is_empty() {
            self.send_text(chat_id, &format!("{}{}", CONTINUED_PREFIX, remainder), markup)
                .await
        } else if let Some(markup) = markup {
            self.send_part(chat_id, SOURCES_HEADER, Some(markup)).await
        } else {
            Ok(())
        };
        if let Err(e) = follow_up {
            warn!("Media group sent but follow-up message failed: {}", e);
        }

        Ok(true)
    }

    /// Splits long text into numbered parts; the keyboard goes on the last one.
    pub async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<()> {
        let parts = if text.chars().count() <= self.limits.max_message_length {
            vec![text.to_string()]
        } else {
            split_text(
                text,
                self.limits
                    .max_message_length
                    .saturating_sub(CONTINUATION_RESERVE),
            )
        };

        let total = parts.len();
        for (i, part) in parts.iter().enumerate() {
            let is_last = i + 1 == total;
            let body = if i == 0 {
                part.clone()
            } else {
                format!("📄 *Continued ({}/{}):*\n\n{}", i + 1, total, part)
            };

            self.send_part(chat_id, &body, if is_last { markup } else { None })
                .await?;

            if !is_last && !self.message_delay.is_zero() {
                tokio::time::sleep(self.message_delay).await;
            }
        }

        Ok(())
    }

    /// Markdown first, plain text when Telegram rejects the entities.
    async fn send_part(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<()> {
        if let Err(e) = self
            .api
            .send_message(chat_id, text, Some(ParseMode::Markdown), markup)
            .await
        {
            warn!("Markdown send failed, retrying as plain text: {}", e);
            self.api.send_message(chat_id, text, None, markup).await?;
        }
        Ok(())
    }
}
