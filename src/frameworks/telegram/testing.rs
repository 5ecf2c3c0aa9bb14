// file: src/frameworks/telegram/testing.rs
// description: recording bot api and canned agent used by the telegram unit tests
// reference: internal test support

use crate::error::{RagError, Result};
use crate::frameworks::telegram::api::BotApi;
use crate::frameworks::telegram::types::{
    CallbackQuery, Chat, InlineKeyboardMarkup, MediaPhoto, Message, ParseMode, Update, User,
};
use crate::usecases::agent::{AgentResponse, ChatMessage};
use crate::usecases::interfaces::ConversationalAgent;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Message {
        chat_id: i64,
        text: String,
        parse_mode: Option<ParseMode>,
        markup: Option<InlineKeyboardMarkup>,
    },
    MediaGroup {
        chat_id: i64,
        photos: Vec<MediaPhoto>,
    },
    Action(i64),
    CallbackAnswer(String),
    Edit {
        message_id: i64,
        text: String,
    },
}

#[derive(Default)]
pub struct RecordingBot {
    pub sent: Mutex<Vec<Sent>>,
    pub updates: Mutex<VecDeque<Vec<Update>>>,
    pub shutdown: Mutex<Option<CancellationToken>>,
    pub fail_markdown: AtomicBool,
    pub fail_media: AtomicBool,
    pub fail_plain: AtomicBool,
}

impl RecordingBot {
    pub fn messages(&self) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| !matches!(s, Sent::Action(_)))
            .cloned()
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Message { text, .. } | Sent::Edit { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn action_count(&self) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| matches!(s, Sent::Action(_)))
            .count()
    }

    pub fn set(&self, flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    fn record(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }
}

#[async_trait]
impl BotApi for RecordingBot {
    async fn get_me(&self) -> Result<User> {
        Ok(user(1, "rag_bot"))
    }

    async fn delete_webhook(&self, _drop_pending_updates: bool) -> Result<()> {
        Ok(())
    }

    async fn get_updates(&self, _offset: Option<i64>, _timeout_secs: u64) -> Result<Vec<Update>> {
        let next = self.updates.lock().unwrap().pop_front();
        match next {
            Some(updates) => Ok(updates),
            None => {
                if let Some(token) = self.shutdown.lock().unwrap().as_ref() {
                    token.cancel();
                }
                Ok(Vec::new())
            }
        }
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<()> {
        if parse_mode.is_some() && self.fail_markdown.load(Ordering::SeqCst) {
            return Err(RagError::Telegram("can't parse entities".to_string()));
        }
        if parse_mode.is_none() && self.fail_plain.load(Ordering::SeqCst) {
            return Err(RagError::Telegram("chat not found".to_string()));
        }
        self.record(Sent::Message {
            chat_id,
            text: text.to_string(),
            parse_mode,
            markup: reply_markup.cloned(),
        });
        Ok(())
    }

    async fn send_media_group(&self, chat_id: i64, photos: &[MediaPhoto]) -> Result<()> {
        if self.fail_media.load(Ordering::SeqCst) {
            return Err(RagError::Telegram("wrong file identifier".to_string()));
        }
        self.record(Sent::MediaGroup {
            chat_id,
            photos: photos.to_vec(),
        });
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: i64, _action: &str) -> Result<()> {
        self.record(Sent::Action(chat_id));
        Ok(())
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        self.record(Sent::CallbackAnswer(callback_query_id.to_string()));
        Ok(())
    }

    async fn edit_message_text(
        &self,
        _chat_id: i64,
        message_id: i64,
        text: &str,
        _parse_mode: Option<ParseMode>,
    ) -> Result<()> {
        self.record(Sent::Edit {
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }
}

/// Replies with a fixed response and records what it was asked.
#[derive(Default)]
pub struct CannedAgent {
    pub response: AgentResponse,
    pub calls: Mutex<Vec<(String, Option<String>, usize)>>,
    pub panic: bool,
}

impl CannedAgent {
    pub fn replying(response: AgentResponse) -> Self {
        Self {
            response,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ConversationalAgent for CannedAgent {
    async fn process_message(
        &self,
        message: &str,
        chat_id: Option<&str>,
        history: &[ChatMessage],
    ) -> AgentResponse {
        if self.panic {
            panic!("agent crashed");
        }
        self.calls.lock().unwrap().push((
            message.to_string(),
            chat_id.map(str::to_string),
            history.len(),
        ));
        self.response.clone()
    }
}

pub fn user(id: i64, first_name: &str) -> User {
    User {
        id,
        is_bot: false,
        first_name: first_name.to_string(),
        username: None,
    }
}

pub fn text_update(update_id: i64, user_id: i64, text: &str) -> Update {
    Update {
        update_id,
        message: Some(Message {
            message_id: update_id * 10,
            chat: Chat { id: user_id },
            from: Some(user(user_id, "Ana")),
            text: Some(text.to_string()),
        }),
        callback_query: None,
    }
}

pub fn callback_update(update_id: i64, user_id: i64, data: &str) -> Update {
    Update {
        update_id,
        message: None,
        callback_query: Some(CallbackQuery {
            id: format!("cb{}", update_id),
            from: user(user_id, "Ana"),
            message: Some(Message {
                message_id: 99,
                chat: Chat { id: user_id },
                from: None,
                text: Some("answer".to_string()),
            }),
            data: Some(data.to_string()),
        }),
    }
}
