use async_trait::async_trait;
use thiserror::Error;

use huddle_core::domain::message::{ChatMessage, SortOrder};

pub mod memory;
pub mod message;

pub use memory::InMemoryMessageRepository;
pub use message::SqlMessageRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                Self::Unavailable(error.to_string())
            }
            other => Self::Database(other),
        }
    }
}

/// Append-only log of chat messages.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append(&self, message: ChatMessage) -> Result<(), RepositoryError>;

    /// The `limit` most recent messages by `ts`, returned in `order`.
    async fn recent(
        &self,
        limit: u32,
        order: SortOrder,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;
}
