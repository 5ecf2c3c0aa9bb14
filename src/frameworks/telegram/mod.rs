// file: src/frameworks/telegram/mod.rs
// description: telegram bot front end for the conversational agent
// reference: https://core.telegram.org/bots/api

pub mod api;
pub mod chunks;
pub mod conversation;
pub mod formatter;
pub mod handlers;
pub mod markdown;
pub mod service;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{BotApi, TelegramClient};
pub use chunks::ChunkManager;
pub use conversation::ConversationManager;
pub use formatter::ResponseFormatter;
pub use handlers::MessageHandlers;
pub use service::TelegramBotService;
