// src/repositories/postgres/webhook.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row};

use hookline_common::models::{NewWebhook, Webhook};
use hookline_common::traits::repository_traits::WebhookRepository;
use crate::Error;

#[derive(Clone)]
pub struct PostgresWebhookRepository {
    pool: Pool<Postgres>,
}

impl PostgresWebhookRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_webhook(r: &PgRow) -> Result<Webhook, Error> {
    Ok(Webhook {
        id: r.try_get("id")?,
        session_id: r.try_get("session_id")?,
        url: r.try_get("url")?,
        secret: r.try_get("secret")?,
        events: r.try_get::<Vec<String>, _>("events")?,
        active: r.try_get("active")?,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: r.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[async_trait]
impl WebhookRepository for PostgresWebhookRepository {
    async fn list_for_session(&self, session_id: i32) -> Result<Vec<Webhook>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, url, secret, events, active, created_at, updated_at
            FROM webhooks
            WHERE session_id = $1
            ORDER BY id
            "#,
        )
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_webhook).collect()
    }

    async fn list_active_for_session(&self, session_id: i32) -> Result<Vec<Webhook>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, url, secret, events, active, created_at, updated_at
            FROM webhooks
            WHERE session_id = $1 AND active = TRUE
            ORDER BY id
            "#,
        )
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_webhook).collect()
    }

    async fn upsert(&self, session_id: i32, webhook: &NewWebhook) -> Result<Webhook, Error> {
        let row = sqlx::query(
            r#"
            INSERT INTO webhooks (session_id, url, secret, events, active)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (session_id, url) DO UPDATE
               SET secret = EXCLUDED.secret,
                   events = EXCLUDED.events,
                   active = TRUE,
                   updated_at = NOW()
            RETURNING id, session_id, url, secret, events, active, created_at, updated_at
            "#,
        )
            .bind(session_id)
            .bind(&webhook.url)
            .bind(&webhook.secret)
            .bind(webhook.events_or_default())
            .fetch_one(&self.pool)
            .await?;
        row_to_webhook(&row)
    }

    async fn delete(&self, id: i32) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
