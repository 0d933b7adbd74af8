// src/repositories/postgres/message.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row};

use hookline_common::models::{Message, MessageFilter, NewMessage};
use hookline_common::traits::repository_traits::MessageRepository;
use crate::Error;
use super::map_unique_violation;

const MESSAGE_COLUMNS: &str = r#"
    id, session_id, message_id, from_number, to_number, contact_name, group_id,
    chat_name, author, from_me, message_type, content, timestamp, webhook_sent, created_at
"#;

#[derive(Clone)]
pub struct PostgresMessageRepository {
    pool: Pool<Postgres>,
}

impl PostgresMessageRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// `LIKE` pattern matching `needle` as a plain substring.
fn contains_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn row_to_message(r: &PgRow) -> Result<Message, Error> {
    Ok(Message {
        id: r.try_get("id")?,
        session_id: r.try_get("session_id")?,
        message_id: r.try_get("message_id")?,
        from_number: r.try_get("from_number")?,
        to_number: r.try_get("to_number")?,
        contact_name: r.try_get("contact_name")?,
        group_id: r.try_get("group_id")?,
        chat_name: r.try_get("chat_name")?,
        author: r.try_get("author")?,
        from_me: r.try_get("from_me")?,
        message_type: r.try_get("message_type")?,
        content: r.try_get("content")?,
        timestamp: r.try_get::<DateTime<Utc>, _>("timestamp")?,
        webhook_sent: r.try_get("webhook_sent")?,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn get(&self, id: i64) -> Result<Option<Message>, Error> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => Ok(Some(row_to_message(&r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_platform_id(
        &self,
        session_id: i32,
        message_id: &str,
    ) -> Result<Option<Message>, Error> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = $1 AND message_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(session_id)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => Ok(Some(row_to_message(&r)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, message: &NewMessage) -> Result<Message, Error> {
        let sql = format!(
            r#"
            INSERT INTO messages (
                session_id, message_id, from_number, to_number, contact_name, group_id,
                chat_name, author, from_me, message_type, content, timestamp, webhook_sent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(message.session_id)
            .bind(&message.message_id)
            .bind(&message.from_number)
            .bind(&message.to_number)
            .bind(&message.contact_name)
            .bind(&message.group_id)
            .bind(&message.chat_name)
            .bind(&message.author)
            .bind(message.from_me)
            .bind(&message.message_type)
            .bind(&message.content)
            .bind(message.timestamp)
            .bind(message.webhook_sent)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                map_unique_violation(
                    e,
                    &format!("message {} in session {}", message.message_id, message.session_id),
                )
            })?;
        row_to_message(&row)
    }

    async fn list(
        &self,
        session_id: i32,
        filter: &MessageFilter,
    ) -> Result<(Vec<Message>, i64), Error> {
        let phone_pattern = filter
            .phone
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(contains_pattern);

        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE session_id = $1
              AND ($2::text IS NULL OR from_number LIKE $2 ESCAPE '\' OR to_number LIKE $2 ESCAPE '\')
            ORDER BY timestamp DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .bind(&phone_pattern)
            .bind(filter.limit.max(0))
            .bind(filter.offset.max(0))
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages
            WHERE session_id = $1
              AND ($2::text IS NULL OR from_number LIKE $2 ESCAPE '\' OR to_number LIKE $2 ESCAPE '\')
            "#,
        )
            .bind(session_id)
            .bind(&phone_pattern)
            .fetch_one(&self.pool)
            .await?;

        let messages = rows.iter().map(row_to_message).collect::<Result<Vec<_>, _>>()?;
        Ok((messages, total))
    }

    async fn mark_webhook_sent(&self, id: i64) -> Result<(), Error> {
        sqlx::query("UPDATE messages SET webhook_sent = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
