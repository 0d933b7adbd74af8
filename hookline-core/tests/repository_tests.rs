// tests/repository_tests.rs
//
// Needs a local Postgres (see test_utils::helpers). These share one database,
// so run them with `--ignored --test-threads=1`.

use chrono::{Duration, Utc};
use serde_json::json;

use hookline_common::models::{
    MessageFilter, NewMessage, NewSession, NewWebhook, SessionStatus, SessionUpdate,
};
use hookline_core::repositories::postgres::{
    PostgresMessageRepository, PostgresSessionRepository, PostgresWebhookRepository,
};
use hookline_core::repositories::{MessageRepository, SessionRepository, WebhookRepository};
use hookline_core::test_utils::helpers::setup_test_database;
use hookline_core::Error;

fn new_message(session_id: i32, message_id: &str, from: &str, age_secs: i64) -> NewMessage {
    NewMessage {
        session_id,
        message_id: message_id.into(),
        from_number: from.into(),
        to_number: Some("999@c.us".into()),
        contact_name: None,
        group_id: None,
        chat_name: None,
        author: None,
        from_me: false,
        message_type: "chat".into(),
        content: "body".into(),
        timestamp: Utc::now() - Duration::seconds(age_secs),
        webhook_sent: false,
    }
}

#[tokio::test]
#[ignore]
async fn session_lifecycle_columns() -> Result<(), Error> {
    let db = setup_test_database().await?;
    let repo = PostgresSessionRepository::new(db.pool().clone());

    let created = repo
        .create(&NewSession { id: None, session_name: "support".into(), user_id: 1, webhook_url: None })
        .await?;
    assert_eq!(created.status, SessionStatus::Disconnected);

    let dup = repo
        .create(&NewSession { id: None, session_name: "support".into(), user_id: 1, webhook_url: None })
        .await;
    assert!(matches!(dup, Err(Error::Duplicate(_))));

    let update = SessionUpdate::status(SessionStatus::Connecting)
        .with_qr(Some("data:image/svg+xml;base64,AA".into()))
        .with_session_data(Some(json!({"version": 1, "entries": []})));
    repo.update_state(created.id, &update).await?;

    let row = repo.get(created.id).await?.expect("row exists");
    assert_eq!(row.status, SessionStatus::Connecting);
    assert!(row.qr_code.is_some());
    assert_eq!(row.session_data.as_ref().unwrap()["version"], 1);

    // Untouched columns survive a partial update.
    repo.update_state(created.id, &SessionUpdate::status(SessionStatus::Connected).with_qr(None))
        .await?;
    let row = repo.get(created.id).await?.expect("row exists");
    assert_eq!(row.qr_code, None);
    assert!(row.session_data.is_some());

    let active = repo
        .list_by_status(&[SessionStatus::Connected, SessionStatus::Connecting])
        .await?;
    assert_eq!(active.len(), 1);

    assert!(repo.delete(created.id).await?);
    assert!(repo.get(created.id).await?.is_none());
    Ok(())
}

#[tokio::test]
#[ignore]
async fn webhook_upsert_is_keyed_by_url() -> Result<(), Error> {
    let db = setup_test_database().await?;
    let sessions = PostgresSessionRepository::new(db.pool().clone());
    let repo = PostgresWebhookRepository::new(db.pool().clone());
    let s = sessions
        .create(&NewSession { id: Some(7), session_name: "inbox".into(), user_id: 1, webhook_url: None })
        .await?;

    let first = repo
        .upsert(s.id, &NewWebhook { url: "https://a/hook".into(), secret: None, events: None })
        .await?;
    assert_eq!(first.events, vec!["message".to_string()]);

    let second = repo
        .upsert(s.id, &NewWebhook { url: "https://a/hook".into(), secret: Some("k".into()), events: None })
        .await?;
    assert_eq!(first.id, second.id);
    assert_eq!(second.secret.as_deref(), Some("k"));
    assert_eq!(repo.list_active_for_session(s.id).await?.len(), 1);

    assert!(repo.delete(first.id).await?);
    assert!(repo.list_for_session(s.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
#[ignore]
async fn messages_are_unique_and_paged_newest_first() -> Result<(), Error> {
    let db = setup_test_database().await?;
    let sessions = PostgresSessionRepository::new(db.pool().clone());
    let repo = PostgresMessageRepository::new(db.pool().clone());
    let s = sessions
        .create(&NewSession { id: None, session_name: "m".into(), user_id: 1, webhook_url: None })
        .await?;

    let older = repo.insert(&new_message(s.id, "a", "111@c.us", 60)).await?;
    repo.insert(&new_message(s.id, "b", "222@c.us", 30)).await?;
    repo.insert(&new_message(s.id, "c", "111@c.us", 0)).await?;

    let dup = repo.insert(&new_message(s.id, "a", "111@c.us", 0)).await;
    assert!(matches!(dup, Err(Error::Duplicate(_))));

    let found = repo.find_by_platform_id(s.id, "a").await?.expect("stored");
    assert_eq!(found.id, older.id);

    let (page, total) = repo
        .list(s.id, &MessageFilter { limit: 1, offset: 0, phone: Some("111".into()) })
        .await?;
    assert_eq!(total, 2);
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].message_id, "c");

    // Wildcards in the filter are literal characters.
    let (page, total) = repo
        .list(s.id, &MessageFilter { limit: 10, offset: 0, phone: Some("1_1".into()) })
        .await?;
    assert_eq!(total, 0);
    assert!(page.is_empty());

    repo.mark_webhook_sent(older.id).await?;
    assert!(repo.get(older.id).await?.expect("stored").webhook_sent);
    Ok(())
}
