// file: src/frameworks/telegram/service.rs
// description: long-polling loop that dispatches updates to handlers until shutdown
// reference: https://core.telegram.org/bots/api#getupdates

use crate::config::TelegramConfig;
use crate::error::Result;
use crate::frameworks::telegram::api::BotApi;
use crate::frameworks::telegram::handlers::MessageHandlers;
use crate::usecases::interfaces::ConversationalAgent;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const MAX_POLL_BACKOFF_SECS: u64 = 60;

pub struct TelegramBotService {
    api: Arc<dyn BotApi>,
    handlers: Arc<MessageHandlers>,
    poll_timeout_secs: u64,
    shutdown: CancellationToken,
}

fn poll_backoff(failures: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(failures.min(6)).min(MAX_POLL_BACKOFF_SECS))
}

impl TelegramBotService {
    pub fn new(
        api: Arc<dyn BotApi>,
        agent: Arc<dyn ConversationalAgent>,
        config: &TelegramConfig,
    ) -> Self {
        let handlers = Arc::new(MessageHandlers::new(api.clone(), agent, config));
        Self {
            api,
            handlers,
            poll_timeout_secs: config.poll_timeout_secs,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops polling; in-flight updates still finish.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn handlers(&self) -> &MessageHandlers {
        &self.handlers
    }

    pub async fn run(&self) -> Result<()> {
        let me = self.api.get_me().await?;
        info!(
            "Connected as @{}",
            me.username.as_deref().unwrap_or(me.first_name.as_str())
        );
        self.api.delete_webhook(true).await?;

        let mut offset: Option<i64> = None;
        let mut tasks = JoinSet::new();
        let mut failures = 0u32;

        loop {
            let polled = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                polled = self.api.get_updates(offset, self.poll_timeout_secs) => polled,
            };

            match polled {
                Ok(updates) => {
                    failures = 0;
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        let handlers = self.handlers.clone();
                        tasks.spawn(async move {
                            let update_id = update.update_id;
                            if let Err(e) = handlers.handle_update(update).await {
                                error!("Update {} failed: {}", update_id, e);
                            }
                        });
                    }
                }
                Err(e) => {
                    failures += 1;
                    let delay = poll_backoff(failures);
                    warn!("Polling failed ({}), retrying in {:?}", e, delay);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }

            while let Some(Some(joined)) = tasks.join_next().now_or_never() {
                if let Err(e) = joined {
                    error!("Update handler panicked: {}", e);
                }
            }
        }

        info!("Stopping bot, waiting for {} in-flight updates", tasks.len());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Update handler panicked: {}", e);
            }
        }
        info!("Bot stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frameworks::telegram::handlers::HELP_MESSAGE;
    use crate::frameworks::telegram::testing::{CannedAgent, RecordingBot, text_update};
    use crate::usecases::agent::AgentResponse;

    #[test]
    fn test_poll_backoff_is_capped() {
        assert_eq!(poll_backoff(1), Duration::from_secs(2));
        assert_eq!(poll_backoff(3), Duration::from_secs(8));
        assert_eq!(poll_backoff(40), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_run_dispatches_until_shutdown() {
        let bot = Arc::new(RecordingBot::default());
        bot.updates.lock().unwrap().push_back(vec![
            text_update(1, 7, "/help"),
            text_update(2, 8, "What is in the report?"),
        ]);
        let agent = Arc::new(CannedAgent::replying(AgentResponse::text("It covers revenue.")));
        let config = TelegramConfig {
            bot_token: Some("1:x".to_string()),
            message_delay_ms: 0,
            ..TelegramConfig::default()
        };

        let service = TelegramBotService::new(bot.clone(), agent.clone(), &config);
        *bot.shutdown.lock().unwrap() = Some(service.shutdown_token());

        service.run().await.unwrap();

        let mut texts = bot.texts();
        texts.sort();
        assert_eq!(texts, vec!["It covers revenue.".to_string(), HELP_MESSAGE.to_string()]);
        assert_eq!(agent.calls.lock().unwrap().len(), 1);
        assert_eq!(service.handlers().conversations().message_count("8").await, 2);
    }
}
