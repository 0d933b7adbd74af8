// tests/outbound_tests.rs

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use hookline_common::models::{ChatInfo, ContactInfo, MediaSource, OutgoingContent};
use hookline_core::services::{MediaRequest, OutboundSender, SendOptions};
use hookline_core::test_utils::{TestHarness, FAKE_SELF_ID};
use hookline_core::{Error, RuntimeConfig};

async fn connected(tmp: &tempfile::TempDir) -> TestHarness {
    let h = TestHarness::new(tmp.path());
    h.sessions.seed(3, "out", None);
    h.factory.on_open(|c| {
        c.canonical.lock().insert("5551234".into(), "5551234@c.us".into());
        c.add_chat(ChatInfo { id: "5551234@c.us".into(), ..Default::default() });
        c.add_contact(ContactInfo {
            id: "5551234@c.us".into(),
            number: Some("5551234".into()),
            ..Default::default()
        });
        c.add_chat(ChatInfo {
            id: "120@g.us".into(),
            name: Some("Ops".into()),
            is_group: true,
            ..Default::default()
        });
    });
    h.manager.initialize_session(3).await.unwrap();
    h
}

#[tokio::test]
async fn bare_number_is_resolved_and_persisted() {
    let tmp = tempfile::tempdir().unwrap();
    let h = connected(&tmp).await;

    let saved = h.sender.send(3, " 5551234 ", "hi there", SendOptions::default()).await.unwrap();

    assert!(saved.from_me);
    assert!(!saved.webhook_sent);
    assert_eq!(saved.from_number, FAKE_SELF_ID);
    assert_eq!(saved.to_number.as_deref(), Some("5551234@c.us"));
    assert_eq!(saved.message_type, "chat");
    assert_eq!(saved.content, "hi there");
    assert_eq!(saved.contact_name.as_deref(), Some("5551234"));
    assert_eq!(saved.group_id, None);

    let conn = h.factory.connection(3).unwrap();
    assert_eq!(conn.called("send_typing"), 1);
    assert_eq!(conn.sent.lock()[0].0, "5551234@c.us");
}

#[tokio::test]
async fn group_send_records_group_metadata() {
    let tmp = tempfile::tempdir().unwrap();
    let h = connected(&tmp).await;

    let saved = h.sender.send(3, "120@g.us", "standup", SendOptions::default()).await.unwrap();
    assert_eq!(saved.group_id.as_deref(), Some("120@g.us"));
    assert_eq!(saved.chat_name.as_deref(), Some("Ops"));
    assert_eq!(saved.contact_name.as_deref(), Some("Ops"));
    assert_eq!(h.factory.connection(3).unwrap().called("resolve_canonical_id"), 0);
}

#[tokio::test]
async fn rejects_bad_recipients_and_content_before_sending() {
    let tmp = tempfile::tempdir().unwrap();
    let h = connected(&tmp).await;

    assert!(matches!(
        h.sender.send(3, "  ", "x", SendOptions::default()).await,
        Err(Error::InvalidRecipient(_))
    ));
    assert!(matches!(
        h.sender.send(3, "000", "x", SendOptions::default()).await,
        Err(Error::InvalidRecipient(_))
    ));
    assert!(matches!(
        h.sender.send(3, "5551234@c.us", "   ", SendOptions::default()).await,
        Err(Error::EmptyMessage)
    ));
    let doc = SendOptions {
        media: Some(MediaRequest { media_type: Some("document".into()), url: Some("https://x/y.pdf".into()), ..Default::default() }),
        ..Default::default()
    };
    assert!(matches!(
        h.sender.send(3, "5551234@c.us", "", doc).await,
        Err(Error::UnsupportedMediaType(_))
    ));

    let conn = h.factory.connection(3).unwrap();
    assert_eq!(conn.called("send_message"), 0);
    assert_eq!(conn.called("send_typing"), 0);
    assert!(h.messages.all().is_empty());
}

#[tokio::test]
async fn not_connected_session_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let h = TestHarness::new(tmp.path());
    h.sessions.seed(4, "idle", None);
    assert!(matches!(
        h.sender.send(4, "5551234@c.us", "x", SendOptions::default()).await,
        Err(Error::NotConnected(4))
    ));
}

#[tokio::test]
async fn platform_failure_is_not_persisted() {
    let tmp = tempfile::tempdir().unwrap();
    let h = connected(&tmp).await;
    h.factory.connection(3).unwrap().fail_send.store(true, Ordering::SeqCst);

    let err = h.sender.send(3, "5551234@c.us", "x", SendOptions::default()).await.err().unwrap();
    assert!(matches!(err, Error::Platform(_)));
    assert!(h.messages.all().is_empty());
}

#[tokio::test]
async fn image_send_uses_caption_as_content() {
    let tmp = tempfile::tempdir().unwrap();
    let h = connected(&tmp).await;
    let opts = SendOptions {
        media: Some(MediaRequest {
            media_type: Some("image".into()),
            data: Some("data:image/jpeg;base64,/9j/AA==".into()),
            mimetype: Some("image/jpeg".into()),
            caption: Some("look".into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let saved = h.sender.send(3, "5551234@c.us", "ignored", opts).await.unwrap();
    assert_eq!(saved.message_type, "image");
    assert_eq!(saved.content, "look");

    let sent = h.factory.connection(3).unwrap().sent.lock().clone();
    match &sent[0].1 {
        OutgoingContent::Media { media: MediaSource::Inline { data, .. }, caption } => {
            assert_eq!(data, "/9j/AA==");
            assert_eq!(caption, "look");
        }
        other => panic!("unexpected content {:?}", other),
    }
}

#[tokio::test]
async fn typing_delay_follows_request_then_default() {
    let tmp = tempfile::tempdir().unwrap();
    let config = RuntimeConfig {
        auth_data_dir: tmp.path().join("auth"),
        media_dir: tmp.path().join("media"),
        default_typing_delay: Duration::from_millis(60),
        ..RuntimeConfig::default()
    };
    let h = TestHarness::with_config(config);
    h.sessions.seed(3, "slow", None);
    h.manager.initialize_session(3).await.unwrap();

    let started = Instant::now();
    h.sender.send(3, "1@c.us", "a", SendOptions::default()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(60));

    let started = Instant::now();
    let quick = SendOptions { typing_duration_ms: Some(0), ..Default::default() };
    h.sender.send(3, "1@c.us", "b", quick).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(60));
}
