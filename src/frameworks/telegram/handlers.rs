// file: src/frameworks/telegram/handlers.rs
// description: command, message and callback handling for incoming telegram updates
// reference: https://core.telegram.org/bots/api#getting-updates

use crate::config::TelegramConfig;
use crate::error::Result;
use crate::frameworks::telegram::api::BotApi;
use crate::frameworks::telegram::chunks::{ChunkManager, format_chunk_content};
use crate::frameworks::telegram::conversation::ConversationManager;
use crate::frameworks::telegram::formatter::{MessageLimits, ResponseFormatter};
use crate::frameworks::telegram::types::{CallbackQuery, Command, Message, ParseMode, Update};
use crate::usecases::interfaces::ConversationalAgent;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const HELP_MESSAGE: &str = "🤖 *Multimodal RAG Assistant Help*

*What I can do:*
• Answer questions based on document content
• Search through indexed documents
• Provide relevant images and diagrams
• Maintain conversation context

*How to use:*
1. Simply type your question
2. I'll search relevant documents
3. You'll get an answer with supporting images (if available)

*Commands:*
• /start - Start conversation
• /help - Show this help
• /clear - Clear conversation history

*Tips:*
• Be specific in your questions for better results
• You can ask follow-up questions for clarification
• Reference previous answers in your questions";

pub const CLEARED_MESSAGE: &str = "🗑️ Conversation history cleared! You can start fresh.";
pub const PROCESSING_ERROR: &str = "❌ I apologize, but I encountered an error while processing your message. Please try again or contact support if the issue persists.";
pub const SEND_ERROR: &str = "❌ Error sending response. Please try again.";
pub const CHUNK_EXPIRED: &str = "❌ Chunk not found or expired. Please send a new message.";
pub const CHUNK_ERROR: &str = "❌ Error retrieving chunk content. Please try again.";

pub fn welcome_message(first_name: &str) -> String {
    format!(
        "👋 Hello {}!

I'm your intelligent document assistant powered by multimodal RAG. I can help you find information from documents and answer your questions.

📖 Simply send me a message with your question, and I'll search through the available documents to provide you with relevant answers.

🖼️ If there are relevant images or diagrams in the documents, I'll include them in my response.

Commands:
• /help - Show this help message
• /clear - Clear conversation history

What would you like to know?",
        first_name
    )
}

pub struct MessageHandlers {
    api: Arc<dyn BotApi>,
    agent: Arc<dyn ConversationalAgent>,
    conversations: Arc<ConversationManager>,
    chunks: Arc<ChunkManager>,
    formatter: ResponseFormatter,
    max_chunk_display_length: usize,
    typing_interval: Duration,
}

impl MessageHandlers {
    pub fn new(
        api: Arc<dyn BotApi>,
        agent: Arc<dyn ConversationalAgent>,
        config: &TelegramConfig,
    ) -> Self {
        let chunks = Arc::new(ChunkManager::new());
        let formatter = ResponseFormatter::new(
            api.clone(),
            chunks.clone(),
            MessageLimits::from(config),
            Duration::from_millis(config.message_delay_ms),
        );

        Self {
            api,
            agent,
            conversations: Arc::new(ConversationManager::new(config.max_conversation_length)),
            chunks,
            formatter,
            max_chunk_display_length: config.max_chunk_display_length,
            typing_interval: Duration::from_secs(config.typing_interval_secs.max(1)),
        }
    }

    pub fn conversations(&self) -> &ConversationManager {
        &self.conversations
    }

    pub fn chunks(&self) -> &ChunkManager {
        &self.chunks
    }

    pub async fn handle_update(&self, update: Update) -> Result<()> {
        if let Some(query) = update.callback_query {
            return self.handle_callback(query).await;
        }
        match update.message {
            Some(message) => self.handle_message(message).await,
            None => {
                debug!("Ignoring update {} without message", update.update_id);
                Ok(())
            }
        }
    }

    async fn handle_message(&self, message: Message) -> Result<()> {
        let Some(text) = message.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(());
        };

        let chat_id = message.chat.id;
        let user_id = message
            .from
            .as_ref()
            .map_or(chat_id, |u| u.id)
            .to_string();

        match Command::parse(text) {
            Some(Command::Start) => {
                let first_name = message
                    .from
                    .as_ref()
                    .map(|u| u.first_name.as_str())
                    .filter(|n| !n.is_empty())
                    .unwrap_or("there");
                info!("User {} started the bot", user_id);
                self.api
                    .send_message(chat_id, &welcome_message(first_name), None, None)
                    .await
            }
            Some(Command::Help) => {
                self.api
                    .send_message(chat_id, HELP_MESSAGE, Some(ParseMode::Markdown), None)
                    .await
            }
            Some(Command::Clear) => {
                self.conversations.clear(&user_id).await;
                self.chunks.clear_user_chunks(&user_id).await;
                info!("Cleared conversation for user {}", user_id);
                self.api
                    .send_message(chat_id, CLEARED_MESSAGE, None, None)
                    .await
            }
            Some(Command::Unknown) => {
                debug!("Ignoring unknown command from {}: {}", user_id, text);
                Ok(())
            }
            None => self.handle_question(chat_id, &user_id, text).await,
        }
    }

    async fn handle_question(&self, chat_id: i64, user_id: &str, text: &str) -> Result<()> {
        info!("Message from {}: {}", user_id, text);

        if let Err(e) = self.api.send_chat_action(chat_id, "typing").await {
            debug!("Typing action failed: {}", e);
        }
        let typing = CancellationToken::new();
        let typing_task = tokio::spawn(keep_typing(
            self.api.clone(),
            chat_id,
            self.typing_interval,
            typing.clone(),
        ));

        let history = self.conversations.history(user_id).await;
        let agent = self.agent.clone();
        let question = text.to_string();
        let user = user_id.to_string();
        let outcome = tokio::spawn(async move {
            agent
                .process_message(&question, Some(user.as_str()), &history)
                .await
        })
        .await;

        typing.cancel();
        if let Err(e) = typing_task.await {
            debug!("Typing task ended abnormally: {}", e);
        }

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                error!("Agent task failed for user {}: {}", user_id, e);
                return self
                    .api
                    .send_message(chat_id, PROCESSING_ERROR, None, None)
                    .await;
            }
        };

        self.conversations.add_user_message(user_id, text).await;
        self.conversations
            .add_assistant_message(user_id, &response.content)
            .await;

        if let Err(e) = self.formatter.send_response(chat_id, user_id, &response).await {
            error!("Failed to deliver response to {}: {}", user_id, e);
            self.api.send_message(chat_id, SEND_ERROR, None, None).await?;
        }
        Ok(())
    }

    async fn handle_callback(&self, query: CallbackQuery) -> Result<()> {
        if let Err(e) = self.api.answer_callback_query(&query.id).await {
            warn!("Failed to answer callback {}: {}", query.id, e);
        }

        let Some(key) = query.data.as_deref() else {
            return Ok(());
        };
        let user_id = query.from.id.to_string();
        let origin = query.message.as_ref().map(|m| (m.chat.id, m.message_id));
        let chat_id = origin.map_or(query.from.id, |(chat_id, _)| chat_id);

        let Some(chunk) = self.chunks.get_chunk(&user_id, key).await else {
            info!("Chunk {} not available for user {}", key, user_id);
            return self.reply_in_place(chat_id, origin, CHUNK_EXPIRED).await;
        };

        let body = format_chunk_content(&chunk, self.max_chunk_display_length);
        if let Err(e) = self
            .api
            .send_message(chat_id, &body, Some(ParseMode::Markdown), None)
            .await
        {
            error!("Failed to send chunk {}: {}", chunk.chunk_id, e);
            return self.reply_in_place(chat_id, origin, CHUNK_ERROR).await;
        }
        Ok(())
    }

    /// Edits the message holding the button, or sends a new one when it is gone.
    async fn reply_in_place(
        &self,
        chat_id: i64,
        origin: Option<(i64, i64)>,
        text: &str,
    ) -> Result<()> {
        match origin {
            Some((chat_id, message_id)) => {
                self.api
                    .edit_message_text(chat_id, message_id, text, None)
                    .await
            }
            None => self.api.send_message(chat_id, text, None, None).await,
        }
    }
}

/// Repeats the "typing" action every `interval` until cancelled.
async fn keep_typing(
    api: Arc<dyn BotApi>,
    chat_id: i64,
    interval: Duration,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if let Err(e) = api.send_chat_action(chat_id, "typing").await {
            debug!("Typing action failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{DocChunk, DocMeta};
    use crate::frameworks::telegram::testing::{
        CannedAgent, RecordingBot, Sent, callback_update, text_update,
    };
    use crate::usecases::agent::AgentResponse;
    use pretty_assertions::assert_eq;

    fn config() -> TelegramConfig {
        TelegramConfig {
            bot_token: Some("1:x".to_string()),
            message_delay_ms: 0,
            ..TelegramConfig::default()
        }
    }

    fn answer_with_source() -> AgentResponse {
        let mut chunk = DocChunk::new("Revenue grew 12%.", DocMeta::default());
        chunk.chunk_id = Some("report_chunk_4".to_string());
        chunk.document_id = Some("report".to_string());
        AgentResponse {
            content: "Revenue grew.".to_string(),
            chunk_ids_used: vec!["report_chunk_4".to_string()],
            retrieved_chunks: vec![chunk],
            ..AgentResponse::default()
        }
    }

    fn handlers(bot: Arc<RecordingBot>, agent: Arc<CannedAgent>) -> MessageHandlers {
        MessageHandlers::new(bot, agent, &config())
    }

    #[tokio::test]
    async fn test_start_and_help() {
        let bot = Arc::new(RecordingBot::default());
        let handlers = handlers(bot.clone(), Arc::new(CannedAgent::default()));

        handlers.handle_update(text_update(1, 7, "/start")).await.unwrap();
        handlers.handle_update(text_update(2, 7, "/help")).await.unwrap();

        let texts = bot.texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].starts_with("👋 Hello Ana!"));
        assert_eq!(texts[1], HELP_MESSAGE);
    }

    #[tokio::test]
    async fn test_unknown_command_is_ignored() {
        let bot = Arc::new(RecordingBot::default());
        let agent = Arc::new(CannedAgent::default());
        let handlers = handlers(bot.clone(), agent.clone());

        handlers.handle_update(text_update(1, 7, "/stats")).await.unwrap();

        assert!(bot.messages().is_empty());
        assert!(agent.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_question_flow_records_history() {
        let bot = Arc::new(RecordingBot::default());
        let agent = Arc::new(CannedAgent::replying(answer_with_source()));
        let handlers = handlers(bot.clone(), agent.clone());

        handlers
            .handle_update(text_update(1, 7, "How did revenue change?"))
            .await
            .unwrap();
        handlers
            .handle_update(text_update(2, 7, "And costs?"))
            .await
            .unwrap();

        let calls = agent.calls.lock().unwrap().clone();
        assert_eq!(calls[0], ("How did revenue change?".to_string(), Some("7".to_string()), 0));
        assert_eq!(calls[1].2, 2);
        assert_eq!(handlers.conversations().message_count("7").await, 4);
        assert!(bot.action_count() >= 2);

        let messages = bot.messages();
        let Sent::Message { text, markup, .. } = &messages[0] else {
            panic!("expected a message");
        };
        assert_eq!(text, "Revenue grew.");
        assert_eq!(
            markup.as_ref().unwrap().inline_keyboard[0][0].callback_data,
            "report_chunk_4"
        );
    }

    #[tokio::test]
    async fn test_agent_panic_sends_apology() {
        let bot = Arc::new(RecordingBot::default());
        let agent = Arc::new(CannedAgent {
            panic: true,
            ..CannedAgent::default()
        });
        let handlers = handlers(bot.clone(), agent);

        handlers.handle_update(text_update(1, 7, "hello")).await.unwrap();

        assert_eq!(bot.texts(), vec![PROCESSING_ERROR]);
        assert_eq!(handlers.conversations().message_count("7").await, 0);
    }

    #[tokio::test]
    async fn test_send_failure_reports_error() {
        let bot = Arc::new(RecordingBot::default());
        bot.set(&bot.fail_markdown);
        bot.set(&bot.fail_plain);
        let agent = Arc::new(CannedAgent::replying(AgentResponse::text("Answer")));
        let handlers = handlers(bot.clone(), agent);

        let result = handlers.handle_update(text_update(1, 7, "hello")).await;

        assert!(result.is_err());
        assert!(bot.texts().is_empty());
    }

    #[tokio::test]
    async fn test_source_button_shows_chunk() {
        let bot = Arc::new(RecordingBot::default());
        let agent = Arc::new(CannedAgent::replying(answer_with_source()));
        let handlers = handlers(bot.clone(), agent);

        handlers.handle_update(text_update(1, 7, "revenue?")).await.unwrap();
        handlers
            .handle_update(callback_update(2, 7, "report_chunk_4"))
            .await
            .unwrap();

        let messages = bot.messages();
        assert!(messages.contains(&Sent::CallbackAnswer("cb2".to_string())));
        let last = bot.texts().pop().unwrap();
        assert!(last.contains("`report_chunk_4`"));
        assert!(last.contains("Revenue grew 12%."));
    }

    #[tokio::test]
    async fn test_clear_expires_buttons() {
        let bot = Arc::new(RecordingBot::default());
        let agent = Arc::new(CannedAgent::replying(answer_with_source()));
        let handlers = handlers(bot.clone(), agent);

        handlers.handle_update(text_update(1, 7, "revenue?")).await.unwrap();
        handlers.handle_update(text_update(2, 7, "/clear")).await.unwrap();
        handlers
            .handle_update(callback_update(3, 7, "report_chunk_4"))
            .await
            .unwrap();

        assert_eq!(handlers.conversations().message_count("7").await, 0);
        assert!(handlers.chunks().user_chunk_ids("7").await.is_empty());
        let messages = bot.messages();
        assert_eq!(
            messages.last(),
            Some(&Sent::Edit {
                message_id: 99,
                text: CHUNK_EXPIRED.to_string(),
            })
        );
        assert!(bot.texts().contains(&CLEARED_MESSAGE.to_string()));
    }
}
