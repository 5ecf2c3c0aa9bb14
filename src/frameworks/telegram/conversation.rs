// file: src/frameworks/telegram/conversation.rs
// description: per-user conversation history kept in memory for the bot
// reference: https://docs.rs/tokio/latest/tokio/sync/struct.RwLock.html

use crate::usecases::agent::ChatMessage;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub struct ConversationManager {
    max_length: usize,
    conversations: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl ConversationManager {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
            conversations: RwLock::new(HashMap::new()),
        }
    }

    pub async fn history(&self, user_id: &str) -> Vec<ChatMessage> {
        self.conversations
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Appends and keeps only the newest `max_length` messages.
    pub async fn add_message(&self, user_id: &str, message: ChatMessage) {
        let mut conversations = self.conversations.write().await;
        let history = conversations.entry(user_id.to_string()).or_default();
        history.push(message);
        if history.len() > self.max_length {
            let excess = history.len() - self.max_length;
            history.drain(..excess);
        }
    }

    pub async fn add_user_message(&self, user_id: &str, content: &str) {
        self.add_message(user_id, ChatMessage::user(content)).await;
    }

    pub async fn add_assistant_message(&self, user_id: &str, content: &str) {
        self.add_message(user_id, ChatMessage::assistant(content))
            .await;
    }

    /// `true` when the user had a history to clear.
    pub async fn clear(&self, user_id: &str) -> bool {
        self.conversations.write().await.remove(user_id).is_some()
    }

    pub async fn active_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.conversations.read().await.keys().cloned().collect();
        users.sort();
        users
    }

    pub async fn message_count(&self, user_id: &str) -> usize {
        self.conversations
            .read()
            .await
            .get(user_id)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::agent::MessageRole;

    #[tokio::test]
    async fn test_history_is_trimmed_to_newest() {
        let manager = ConversationManager::new(3);
        for i in 0..5 {
            manager.add_user_message("42", &format!("m{}", i)).await;
        }

        let history = manager.history("42").await;
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
        assert_eq!(manager.message_count("42").await, 3);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let manager = ConversationManager::new(10);
        manager.add_user_message("a", "question").await;
        manager.add_assistant_message("a", "answer").await;
        manager.add_user_message("b", "other").await;

        let history = manager.history("a").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, MessageRole::Assistant);
        assert_eq!(manager.active_users().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_clear() {
        let manager = ConversationManager::new(10);
        manager.add_user_message("a", "question").await;

        assert!(manager.clear("a").await);
        assert!(!manager.clear("a").await);
        assert!(manager.history("a").await.is_empty());
    }
}
