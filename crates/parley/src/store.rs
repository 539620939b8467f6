use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::turn::{ConversationTurn, TurnPatch};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),
}

/// Ordered turns per thread. Each call is applied atomically; concurrent writers to the
/// same thread are last-writer-wins.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// All turns of a thread in order. An unknown thread has no turns.
    async fn get_thread_messages(
        &self,
        thread_id: &str,
    ) -> Result<Vec<ConversationTurn>, StoreError>;

    async fn add_message(&self, thread_id: &str, turn: ConversationTurn) -> Result<(), StoreError>;

    /// Apply a patch to one turn and return the updated turn
    async fn update_message(
        &self,
        thread_id: &str,
        message_id: &str,
        patch: TurnPatch,
    ) -> Result<ConversationTurn, StoreError>;
}

/// A store that keeps threads in memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    threads: RwLock<HashMap<String, Vec<ConversationTurn>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get_thread_messages(
        &self,
        thread_id: &str,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).cloned().unwrap_or_default())
    }

    async fn add_message(&self, thread_id: &str, turn: ConversationTurn) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        threads.entry(thread_id.to_string()).or_default().push(turn);
        Ok(())
    }

    async fn update_message(
        &self,
        thread_id: &str,
        message_id: &str,
        patch: TurnPatch,
    ) -> Result<ConversationTurn, StoreError> {
        let mut threads = self.threads.write().await;
        let turns = threads
            .get_mut(thread_id)
            .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))?;
        let turn = turns
            .iter_mut()
            .find(|turn| turn.id == message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;

        patch.apply(turn);
        Ok(turn.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::turn::TurnStatus;

    #[tokio::test]
    async fn test_add_and_update() -> anyhow::Result<()> {
        let store = InMemoryStore::new();
        assert!(store.get_thread_messages("t1").await?.is_empty());

        store
            .add_message("t1", ConversationTurn::user().with_id("u1").with_text("Hi"))
            .await?;
        store
            .add_message(
                "t1",
                ConversationTurn::assistant()
                    .with_id("a1")
                    .with_status(TurnStatus::Processing),
            )
            .await?;

        let updated = store
            .update_message(
                "t1",
                "a1",
                TurnPatch::content("Hello").with_status(TurnStatus::Completed),
            )
            .await?;
        assert_eq!(updated.content.to_text(), "Hello");

        let turns = store.get_thread_messages("t1").await?;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].status, TurnStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_unknown_targets() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.update_message("nope", "m", TurnPatch::default()).await,
            Err(StoreError::ThreadNotFound("nope".to_string()))
        );

        store.add_message("t", ConversationTurn::user()).await.unwrap();
        assert_eq!(
            store.update_message("t", "missing", TurnPatch::default()).await,
            Err(StoreError::MessageNotFound("missing".to_string()))
        );
    }
}
