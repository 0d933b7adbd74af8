// tests/session_manager_tests.rs

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::json;

use hookline_common::models::{
    ChatInfo, ConnectionEvent, ContactInfo, GroupParticipant, InboundMessage, LastMessage,
    SessionStatus,
};
use hookline_core::auth::snapshot::serialize_dir;
use hookline_core::eventbus::HookEvent;
use hookline_core::test_utils::{eventually, TestHarness, FAKE_SELF_ID};
use hookline_core::Error;

fn harness() -> (tempfile::TempDir, TestHarness) {
    let tmp = tempfile::tempdir().unwrap();
    let h = TestHarness::new(tmp.path());
    (tmp, h)
}

fn status_of(h: &TestHarness, id: i32) -> SessionStatus {
    h.sessions.snapshot(id).unwrap().status
}

#[tokio::test]
async fn initialize_opens_once_and_connects() {
    let (_tmp, h) = harness();
    h.sessions.seed(1, "support", None);

    let first = h.manager.initialize_session(1).await.unwrap();
    let second = h.manager.initialize_session(1).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(h.factory.opened.load(Ordering::SeqCst), 1);
    assert_eq!(h.factory.connection(1).unwrap().called("connect"), 1);
    assert!(h.config.session_auth_dir(1).is_dir());
    assert_eq!(h.manager.get_all_sessions().len(), 1);
}

#[tokio::test]
async fn initialize_unknown_session_is_not_found() {
    let (_tmp, h) = harness();
    let err = h.manager.initialize_session(404).await.err().unwrap();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(h.manager.get_session(404).is_none());
}

#[tokio::test]
async fn failed_connect_forces_disconnected_and_drops_handle() {
    let (_tmp, h) = harness();
    let mut row = h.sessions.seed(2, "sales", None);
    row.status = SessionStatus::Connecting;
    row.qr_code = Some("data:old".into());
    h.sessions.put(row);
    h.factory.on_open(|c| c.fail_connect.store(true, Ordering::SeqCst));

    let err = h.manager.initialize_session(2).await.err().unwrap();
    assert!(matches!(err, Error::Platform(_)));

    let row = h.sessions.snapshot(2).unwrap();
    assert_eq!(row.status, SessionStatus::Disconnected);
    assert_eq!(row.qr_code, None);
    assert!(h.manager.get_session(2).is_none());
    assert_eq!(h.factory.connection(2).unwrap().called("destroy"), 1);
}

#[tokio::test]
async fn qr_persists_snapshot_once_and_reuses_rendering() {
    let (_tmp, h) = harness();
    h.sessions.seed(3, "qr", None);
    h.factory.auth_files.lock().push(("Default/Cookies".into(), b"cookie".to_vec()));

    let rt = h.manager.initialize_session(3).await.unwrap();
    let conn = h.factory.connection(3).unwrap();

    conn.emit(ConnectionEvent::Qr { code: "2@first".into() });
    assert!(eventually(|| h.sessions.snapshot(3).unwrap().qr_code.is_some()).await);

    let row = h.sessions.snapshot(3).unwrap();
    assert_eq!(row.status, SessionStatus::Connecting);
    assert!(row.qr_code.as_deref().unwrap().starts_with("data:image/svg+xml;base64,"));
    assert_eq!(row.session_data.as_ref().unwrap()["version"], 1);
    assert!(rt.has_pending_auth());
    assert_eq!(rt.status(), SessionStatus::Connecting);

    let first_qr = row.qr_code.clone();
    conn.emit(ConnectionEvent::Qr { code: "2@second".into() });
    assert!(eventually(|| h.sessions.writes_for(3).iter().filter(|u| u.qr_code.is_some()).count() >= 2).await);

    assert_eq!(h.sessions.snapshot(3).unwrap().qr_code, first_qr);
    let snapshot_writes = h
        .sessions
        .writes_for(3)
        .iter()
        .filter(|u| matches!(u.session_data, Some(Some(_))))
        .count();
    assert_eq!(snapshot_writes, 1);
}

#[tokio::test]
async fn ready_clears_pending_artifacts() {
    let (_tmp, h) = harness();
    h.sessions.seed(4, "ready", None);
    h.factory.auth_files.lock().push(("state.json".into(), b"{}".to_vec()));

    let rt = h.manager.initialize_session(4).await.unwrap();
    let conn = h.factory.connection(4).unwrap();
    conn.emit(ConnectionEvent::Qr { code: "2@abc".into() });
    assert!(eventually(|| rt.has_pending_auth()).await);

    conn.emit(ConnectionEvent::Ready);
    assert!(eventually(|| status_of(&h, 4) == SessionStatus::Connected).await);

    let row = h.sessions.snapshot(4).unwrap();
    assert_eq!(row.qr_code, None);
    assert_eq!(row.session_data, None);
    assert!(row.last_seen.is_some());
    assert!(!rt.has_pending_auth());
    assert_eq!(rt.status(), SessionStatus::Connected);
}

#[tokio::test]
async fn state_change_only_connects_on_connected_state() {
    let (_tmp, h) = harness();
    h.sessions.seed(5, "state", None);
    h.manager.initialize_session(5).await.unwrap();
    let conn = h.factory.connection(5).unwrap();

    conn.emit(ConnectionEvent::StateChanged { state: "OPENING".into() });
    conn.emit(ConnectionEvent::StateChanged { state: "CONNECTED".into() });
    assert!(eventually(|| status_of(&h, 5) == SessionStatus::Connected).await);
    let statuses: Vec<_> = h.sessions.writes_for(5).iter().filter_map(|u| u.status).collect();
    assert_eq!(statuses, vec![SessionStatus::Connecting, SessionStatus::Connected]);
}

#[tokio::test]
async fn start_marks_row_connecting_before_any_event() {
    let (_tmp, h) = harness();
    h.sessions.seed(14, "starting", None);
    let mut rx = h.event_bus.subscribe(Some(8)).await;

    let rt = h.manager.initialize_session(14).await.unwrap();

    assert_eq!(status_of(&h, 14), SessionStatus::Connecting);
    assert_eq!(rt.status(), SessionStatus::Connecting);
    assert_eq!(h.sessions.snapshot(14).unwrap().qr_code, None);
    match rx.recv().await.unwrap() {
        HookEvent::SessionStatusChanged { session_id, status } => {
            assert_eq!(session_id, 14);
            assert_eq!(status, SessionStatus::Connecting);
        }
        other => panic!("unexpected event {:?}", other),
    }

    // A restart before the first QR still finds it.
    let candidates = h.manager.initialize_all().await.unwrap();
    assert_eq!(candidates, 1);
    assert_eq!(h.factory.opened.load(Ordering::SeqCst), 1);

    h.factory.connection(14).unwrap().emit(ConnectionEvent::Ready);
    assert!(eventually(|| status_of(&h, 14) == SessionStatus::Connected).await);
}

#[tokio::test]
async fn start_keeps_a_connected_row_connected() {
    let (_tmp, h) = harness();
    let mut row = h.sessions.seed(15, "resume", None);
    row.status = SessionStatus::Connected;
    h.sessions.put(row);

    let rt = h.manager.initialize_session(15).await.unwrap();
    assert_eq!(status_of(&h, 15), SessionStatus::Connected);
    assert_eq!(rt.status(), SessionStatus::Connected);
    assert!(h.sessions.writes_for(15).is_empty());
}

#[tokio::test]
async fn auth_failure_and_disconnect_discard_the_handle() {
    let (_tmp, h) = harness();
    h.sessions.seed(6, "lost", None);
    h.sessions.seed(7, "gone", None);

    h.manager.initialize_session(6).await.unwrap();
    h.manager.initialize_session(7).await.unwrap();
    h.manager.typing().set_typing(6, "111@c.us", true);

    h.factory.connection(6).unwrap().emit(ConnectionEvent::AuthFailure { reason: "bad".into() });
    h.factory.connection(7).unwrap().emit(ConnectionEvent::Disconnected { reason: "LOGOUT".into() });

    assert!(eventually(|| h.manager.get_session(6).is_none() && h.manager.get_session(7).is_none()).await);
    assert_eq!(status_of(&h, 6), SessionStatus::Disconnected);
    assert_eq!(status_of(&h, 7), SessionStatus::Disconnected);
    assert_eq!(h.manager.typing().tracked_chats(6), 0);

    // A fresh start is allowed afterwards.
    h.manager.initialize_session(6).await.unwrap();
    assert_eq!(h.factory.opened.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn stored_snapshot_is_restored_before_connecting() {
    let (tmp, h) = harness();

    let src = tmp.path().join("captured");
    std::fs::create_dir_all(src.join("Default")).unwrap();
    std::fs::write(src.join("Default/Cookies"), b"cookie").unwrap();
    let blob = serialize_dir(&src).await.unwrap().unwrap().to_value().unwrap();

    let mut row = h.sessions.seed(9, "resume", None);
    row.session_data = Some(blob);
    h.sessions.put(row);

    let rt = h.manager.initialize_session(9).await.unwrap();

    let files = h.factory.files_at_open.lock().get(&9).cloned().unwrap();
    assert_eq!(files, vec![std::path::PathBuf::from("Default/Cookies")]);
    assert!(rt.has_pending_auth());
    assert!(h.sessions.snapshot(9).unwrap().session_data.is_some());
}

#[tokio::test]
async fn unusable_snapshot_is_cleared_and_session_starts_fresh() {
    let (_tmp, h) = harness();
    let mut row = h.sessions.seed(9, "resume", None);
    row.session_data = Some(json!({"version": 7, "entries": []}));
    h.sessions.put(row);

    let rt = h.manager.initialize_session(9).await.unwrap();

    assert!(!rt.has_pending_auth());
    assert_eq!(h.sessions.snapshot(9).unwrap().session_data, None);
    assert!(h.factory.files_at_open.lock().get(&9).unwrap().is_empty());
    assert_eq!(h.factory.connection(9).unwrap().called("connect"), 1);
}

#[tokio::test]
async fn close_resets_state_and_reports_handle() {
    let (_tmp, h) = harness();
    h.sessions.seed(10, "close", None);
    h.manager.initialize_session(10).await.unwrap();
    h.factory.connection(10).unwrap().emit(ConnectionEvent::Ready);
    assert!(eventually(|| status_of(&h, 10) == SessionStatus::Connected).await);

    assert!(h.manager.close_session(10).await.unwrap());
    let row = h.sessions.snapshot(10).unwrap();
    assert_eq!(row.status, SessionStatus::Disconnected);
    assert_eq!(row.session_data, None);
    assert!(h.manager.get_session(10).is_none());
    assert_eq!(h.factory.connection(10).unwrap().called("destroy"), 1);

    // No live handle: still marks the row, reports false.
    assert!(!h.manager.close_session(10).await.unwrap());
}

#[tokio::test]
async fn close_with_failing_destroy_still_disconnects() {
    let (_tmp, h) = harness();
    h.sessions.seed(11, "stuck", None);
    h.factory.on_open(|c| c.fail_destroy.store(true, Ordering::SeqCst));
    h.manager.initialize_session(11).await.unwrap();
    h.factory.connection(11).unwrap().emit(ConnectionEvent::Ready);
    assert!(eventually(|| status_of(&h, 11) == SessionStatus::Connected).await);

    let err = h.manager.close_session(11).await.err().unwrap();
    assert!(matches!(err, Error::Platform(_)));
    assert_eq!(status_of(&h, 11), SessionStatus::Disconnected);
    assert!(h.manager.get_session(11).is_none());
}

#[tokio::test]
async fn restart_replaces_the_connection() {
    let (_tmp, h) = harness();
    let mut row = h.sessions.seed(12, "again", None);
    row.qr_code = Some("data:stale".into());
    h.sessions.put(row);

    let old = h.manager.initialize_session(12).await.unwrap();
    let old_conn = h.factory.connection(12).unwrap();

    let fresh = h.manager.restart_session(12).await.unwrap();

    assert!(!Arc::ptr_eq(&old, &fresh));
    assert_eq!(old_conn.called("destroy"), 1);
    assert_eq!(h.factory.opened.load(Ordering::SeqCst), 2);
    let row = h.sessions.snapshot(12).unwrap();
    assert_eq!(row.status, SessionStatus::Connecting);
    assert_eq!(row.qr_code, None);
}

#[tokio::test]
async fn message_events_reach_the_bus() {
    let (_tmp, h) = harness();
    h.sessions.seed(13, "bus", None);
    let mut rx = h.event_bus.subscribe(Some(16)).await;
    h.factory.on_open(|c| {
        c.mentions.lock().push(ContactInfo { id: FAKE_SELF_ID.into(), is_me: true, ..Default::default() });
    });
    h.manager.initialize_session(13).await.unwrap();
    let conn = h.factory.connection(13).unwrap();

    let msg = |id: &str, from: &str, from_me: bool| InboundMessage {
        id: id.into(),
        from: from.into(),
        to: Some(FAKE_SELF_ID.into()),
        author: None,
        from_me,
        message_type: "chat".into(),
        body: "hey".into(),
        timestamp: 1,
        has_media: false,
    };

    conn.emit(ConnectionEvent::Message { message: msg("s1", "status@broadcast", false) });
    conn.emit(ConnectionEvent::MessageCreated { message: msg("c1", "111@c.us", false) });
    conn.emit(ConnectionEvent::Message { message: msg("g1", "120@g.us", false) });
    conn.emit(ConnectionEvent::MessageCreated { message: msg("o1", FAKE_SELF_ID, true) });

    let mut seen = Vec::new();
    while seen.len() < 2 {
        match tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv()).await {
            Ok(Some(HookEvent::InboundMessage { message, is_mention, .. })) => seen.push((message.id, is_mention)),
            Ok(Some(_)) => continue,
            other => panic!("bus closed or timed out: {:?}", other.is_ok()),
        }
    }
    assert_eq!(seen, vec![("g1".to_string(), true), ("o1".to_string(), false)]);
}

#[tokio::test]
async fn typing_events_feed_the_tracker() {
    let (_tmp, h) = harness();
    h.sessions.seed(14, "typing", None);
    h.manager.initialize_session(14).await.unwrap();
    let conn = h.factory.connection(14).unwrap();

    conn.emit(ConnectionEvent::Typing { chat_id: "111@c.us".into() });
    assert!(eventually(|| h.manager.typing().is_typing(14, "111@c.us")).await);

    conn.emit(ConnectionEvent::StopTyping { chat_id: "111@c.us".into() });
    assert!(eventually(|| !h.manager.typing().is_typing(14, "111@c.us")).await);
}

#[tokio::test]
async fn chat_queries_need_a_live_session() {
    let (_tmp, h) = harness();
    let err = h.manager.get_session_chats(15).await.err().unwrap();
    assert!(matches!(err, Error::NotConnected(15)));
}

#[tokio::test]
async fn chats_groups_and_participants() {
    let (_tmp, h) = harness();
    h.sessions.seed(16, "chats", None);
    h.factory.on_open(|c| {
        c.add_chat(ChatInfo {
            id: "111@c.us".into(),
            name: Some("Alice".into()),
            last_message: Some(LastMessage { body: "old".into(), timestamp: Some(10), from_me: false }),
            ..Default::default()
        });
        c.add_chat(ChatInfo {
            id: "120@g.us".into(),
            name: Some("zeta team".into()),
            is_group: true,
            last_message: Some(LastMessage { body: "new".into(), timestamp: Some(20), from_me: true }),
            participants: vec![
                GroupParticipant { id: "300@c.us".into(), is_admin: false, is_super_admin: false },
                GroupParticipant { id: "200@c.us".into(), is_admin: true, is_super_admin: false },
            ],
            ..Default::default()
        });
        c.add_chat(ChatInfo { id: "121@g.us".into(), name: Some("Alpha".into()), is_group: true, ..Default::default() });
        c.add_contact(ContactInfo {
            id: "300@c.us".into(),
            pushname: Some("Trey".into()),
            number: Some("300".into()),
            ..Default::default()
        });
    });
    h.manager.initialize_session(16).await.unwrap();
    h.manager.typing().set_typing(16, "111@c.us", true);

    let chats = h.manager.get_session_chats(16).await.unwrap();
    let ids: Vec<_> = chats.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["120@g.us", "111@c.us", "121@g.us"]);
    assert!(chats[1].is_typing);

    let groups = h.manager.get_session_groups(16).await.unwrap();
    let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "zeta team"]);
    assert_eq!(groups[1].participants, 2);

    let members = h.manager.get_group_participants(16, "120").await.unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].number, "200");
    assert_eq!(members[0].name, "200");
    assert!(members[0].is_admin);
    assert_eq!(members[1].name, "Trey");

    let err = h.manager.get_group_participants(16, "111@c.us").await.err().unwrap();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn initialize_all_restores_active_sessions() {
    let (_tmp, h) = harness();
    for (id, status) in [
        (20, SessionStatus::Connected),
        (21, SessionStatus::Connecting),
        (22, SessionStatus::Disconnected),
    ] {
        let mut row = h.sessions.seed(id, &format!("s{}", id), None);
        row.status = status;
        h.sessions.put(row);
    }

    let restored = hookline_core::tasks::run_autostart(&h.manager).await.unwrap();
    assert_eq!(restored, 2);
    assert!(h.manager.get_session(20).is_some());
    assert!(h.manager.get_session(21).is_some());
    assert!(h.manager.get_session(22).is_none());

    h.manager.shutdown().await;
    assert!(h.manager.get_all_sessions().is_empty());
    assert_eq!(status_of(&h, 20), SessionStatus::Connected);
}
