use tokio::sync::RwLock;

use huddle_core::domain::message::{ChatMessage, SortOrder};

use super::{MessageRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryMessageRepository {
    // Insertion sequence breaks ties between equal `ts` values.
    messages: RwLock<Vec<(u64, ChatMessage)>>,
}

impl InMemoryMessageRepository {
    pub fn with_messages(messages: impl IntoIterator<Item = ChatMessage>) -> Self {
        let messages = messages
            .into_iter()
            .enumerate()
            .map(|(sequence, message)| (sequence as u64, message))
            .collect();
        Self { messages: RwLock::new(messages) }
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: ChatMessage) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        let sequence = messages.len() as u64;
        messages.push((sequence, message));
        Ok(())
    }

    async fn recent(
        &self,
        limit: u32,
        order: SortOrder,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut window: Vec<&(u64, ChatMessage)> = messages.iter().collect();
        window.sort_by(|(left_sequence, left), (right_sequence, right)| {
            (right.ts.as_str(), right_sequence).cmp(&(left.ts.as_str(), left_sequence))
        });
        window.truncate(limit as usize);

        if order == SortOrder::Ascending {
            window.reverse();
        }

        Ok(window.into_iter().map(|(_, message)| message.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use huddle_core::domain::message::{ChatMessage, SortOrder};

    use crate::repositories::{InMemoryMessageRepository, MessageRepository};

    #[tokio::test]
    async fn in_memory_repo_keeps_newest_window() {
        let repo = InMemoryMessageRepository::with_messages(vec![
            ChatMessage::new("first", "A", "1", "C1"),
            ChatMessage::new("third", "C", "3", "C1"),
            ChatMessage::new("second", "B", "2", "C1"),
        ]);

        let ascending = repo.recent(2, SortOrder::Ascending).await.expect("recent");
        let texts: Vec<&str> = ascending.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["second", "third"]);

        let descending = repo.recent(10, SortOrder::Descending).await.expect("recent");
        let texts: Vec<&str> = descending.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn equal_timestamps_follow_insertion_order() {
        let repo = InMemoryMessageRepository::default();
        repo.append(ChatMessage::new("original", "A", "5", "C1")).await.expect("append");
        repo.append(ChatMessage::new("redelivered", "A", "5", "C1")).await.expect("append");

        let ascending = repo.recent(10, SortOrder::Ascending).await.expect("recent");
        let texts: Vec<&str> = ascending.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["original", "redelivered"]);
        assert_eq!(repo.len().await, 2);
    }
}
