// src/repositories/postgres/session.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};

use hookline_common::models::{NewSession, Session, SessionStatus, SessionUpdate};
use hookline_common::traits::repository_traits::SessionRepository;
use crate::Error;
use super::map_unique_violation;

const SESSION_COLUMNS: &str = r#"
    id, session_name, user_id, webhook_url, status, qr_code,
    session_data, last_seen, created_at, updated_at
"#;

#[derive(Clone)]
pub struct PostgresSessionRepository {
    pool: Pool<Postgres>,
}

impl PostgresSessionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_session(r: &PgRow) -> Result<Session, Error> {
    let status_str: String = r.try_get("status")?;
    let status = status_str.parse::<SessionStatus>().map_err(Error::Parse)?;
    Ok(Session {
        id: r.try_get("id")?,
        session_name: r.try_get("session_name")?,
        user_id: r.try_get("user_id")?,
        webhook_url: r.try_get("webhook_url")?,
        status,
        qr_code: r.try_get("qr_code")?,
        session_data: r.try_get::<Option<Value>, _>("session_data")?,
        last_seen: r.try_get::<Option<DateTime<Utc>>, _>("last_seen")?,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: r.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn create(&self, session: &NewSession) -> Result<Session, Error> {
        let sql = format!(
            r#"
            INSERT INTO sessions (id, session_name, user_id, webhook_url, status)
            VALUES (COALESCE($1, nextval(pg_get_serial_sequence('sessions', 'id'))::int), $2, $3, $4, 'disconnected')
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(session.id)
            .bind(&session.session_name)
            .bind(session.user_id)
            .bind(&session.webhook_url)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "session name already used by this user"))?;

        if session.id.is_some() {
            // keep the serial ahead of explicitly assigned ids
            sqlx::query(
                r#"
                SELECT setval(pg_get_serial_sequence('sessions', 'id'),
                              GREATEST((SELECT MAX(id) FROM sessions), 1))
                "#,
            )
                .execute(&self.pool)
                .await?;
        }

        row_to_session(&row)
    }

    async fn get(&self, id: i32) -> Result<Option<Session>, Error> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(row_to_session(&r)?)),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<Session>, Error> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_session).collect()
    }

    async fn list_by_status(&self, statuses: &[SessionStatus]) -> Result<Vec<Session>, Error> {
        let wanted: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE status = ANY($1) ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(&wanted)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_session).collect()
    }

    async fn update_details(
        &self,
        id: i32,
        session_name: &str,
        webhook_url: Option<&str>,
    ) -> Result<Option<Session>, Error> {
        let sql = format!(
            r#"
            UPDATE sessions
               SET session_name = $2,
                   webhook_url = $3,
                   updated_at = NOW()
             WHERE id = $1
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(session_name)
            .bind(webhook_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "session name already used by this user"))?;

        match row {
            Some(r) => Ok(Some(row_to_session(&r)?)),
            None => Ok(None),
        }
    }

    async fn update_state(&self, id: i32, update: &SessionUpdate) -> Result<(), Error> {
        let (set_qr, qr) = match &update.qr_code {
            Some(v) => (true, v.clone()),
            None => (false, None),
        };
        let (set_data, data) = match &update.session_data {
            Some(v) => (true, v.clone()),
            None => (false, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE sessions
               SET status       = COALESCE($2, status),
                   qr_code      = CASE WHEN $3 THEN $4 ELSE qr_code END,
                   session_data = CASE WHEN $5 THEN $6 ELSE session_data END,
                   last_seen    = COALESCE($7, last_seen),
                   updated_at   = NOW()
             WHERE id = $1
            "#,
        )
            .bind(id)
            .bind(update.status.map(|s| s.to_string()))
            .bind(set_qr)
            .bind(qr)
            .bind(set_data)
            .bind(data)
            .bind(update.last_seen)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("session {}", id)));
        }
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
