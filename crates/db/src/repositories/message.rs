use async_trait::async_trait;
use chrono::Utc;
use huddle_core::domain::message::{ChatMessage, SortOrder};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use super::{MessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chat_message")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn append(&self, message: ChatMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO chat_message (channel, ts, user_id, text, received_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.channel)
        .bind(&message.ts)
        .bind(&message.user)
        .bind(&message.text)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(
            event_name = "store.message.appended",
            channel = %message.channel,
            ts = %message.ts,
            "chat message appended"
        );
        Ok(())
    }

    async fn recent(
        &self,
        limit: u32,
        order: SortOrder,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        // Select the newest `limit` rows first, then re-order the window.
        let direction = order.as_sql();
        let sql = format!(
            r#"
            SELECT text, user_id, ts, channel FROM (
                SELECT id, text, user_id, ts, channel
                FROM chat_message
                ORDER BY ts DESC, id DESC
                LIMIT ?
            )
            ORDER BY ts {direction}, id {direction}
            "#
        );

        let rows = sqlx::query(&sql).bind(i64::from(limit)).fetch_all(&self.pool).await?;
        rows.iter().map(message_from_row).collect()
    }
}

fn message_from_row(row: &SqliteRow) -> Result<ChatMessage, RepositoryError> {
    let decode = |column: &str| {
        row.try_get::<String, _>(column)
            .map_err(|error| RepositoryError::Decode(format!("column `{column}`: {error}")))
    };

    Ok(ChatMessage {
        text: decode("text")?,
        user: decode("user_id")?,
        ts: decode("ts")?,
        channel: decode("channel")?,
    })
}
