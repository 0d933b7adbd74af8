// File: hookline-core/src/test_utils/fakes.rs
//
// Scriptable stand-ins for the platform connection and the HTTP client.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use hookline_common::models::{
    ChatInfo, ConnectionEvent, ContactInfo, InboundMessage, MediaBlob, OutgoingContent,
    SentMessage,
};
use hookline_common::traits::{ConnectionFactory, PlatformConnection};

use crate::http::{HttpClient, HttpResponse};
use crate::Error;

pub const FAKE_SELF_ID: &str = "999@c.us";

pub struct FakeConnection {
    pub session_id: i32,
    events: UnboundedSender<ConnectionEvent>,
    pub calls: Mutex<Vec<String>>,
    pub chats: Mutex<HashMap<String, ChatInfo>>,
    pub contacts: Mutex<HashMap<String, ContactInfo>>,
    /// raw address -> canonical chat id
    pub canonical: Mutex<HashMap<String, String>>,
    pub mentions: Mutex<Vec<ContactInfo>>,
    pub media: Mutex<Option<MediaBlob>>,
    pub sent: Mutex<Vec<(String, OutgoingContent)>>,
    pub fail_connect: AtomicBool,
    pub fail_destroy: AtomicBool,
    pub fail_send: AtomicBool,
    next_id: AtomicU64,
}

impl FakeConnection {
    pub fn new(session_id: i32, events: UnboundedSender<ConnectionEvent>) -> Self {
        Self {
            session_id,
            events,
            calls: Mutex::new(Vec::new()),
            chats: Mutex::new(HashMap::new()),
            contacts: Mutex::new(HashMap::new()),
            canonical: Mutex::new(HashMap::new()),
            mentions: Mutex::new(Vec::new()),
            media: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            fail_connect: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
        }
    }

    /// Push an event as if the platform had emitted it.
    pub fn emit(&self, event: ConnectionEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn add_chat(&self, chat: ChatInfo) {
        self.chats.lock().insert(chat.id.clone(), chat);
    }

    pub fn add_contact(&self, contact: ContactInfo) {
        self.contacts.lock().insert(contact.id.clone(), contact);
    }

    pub fn called(&self, op: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == op).count()
    }

    fn record(&self, op: &str) {
        self.calls.lock().push(op.to_string());
    }
}

#[async_trait]
impl PlatformConnection for FakeConnection {
    async fn connect(&self) -> Result<(), Error> {
        self.record("connect");
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Platform("connect refused".into()));
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<(), Error> {
        self.record("destroy");
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(Error::Platform("destroy failed".into()));
        }
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, content: &OutgoingContent) -> Result<SentMessage, Error> {
        self.record("send_message");
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(Error::Platform("send failed".into()));
        }
        self.sent.lock().push((chat_id.to_string(), content.clone()));
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SentMessage {
            id: format!("out-{}", n),
            from: FAKE_SELF_ID.to_string(),
            to: chat_id.to_string(),
            timestamp: Some(Utc::now().timestamp()),
        })
    }

    async fn send_typing(&self, _chat_id: &str) -> Result<(), Error> {
        self.record("send_typing");
        Ok(())
    }

    async fn resolve_canonical_id(&self, address: &str) -> Result<Option<String>, Error> {
        self.record("resolve_canonical_id");
        Ok(self.canonical.lock().get(address).cloned())
    }

    async fn get_chat(&self, chat_id: &str) -> Result<ChatInfo, Error> {
        self.record("get_chat");
        self.chats
            .lock()
            .get(chat_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("chat {}", chat_id)))
    }

    async fn get_contact(&self, contact_id: &str) -> Result<ContactInfo, Error> {
        self.record("get_contact");
        self.contacts
            .lock()
            .get(contact_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("contact {}", contact_id)))
    }

    async fn get_mentions(&self, _message: &InboundMessage) -> Result<Vec<ContactInfo>, Error> {
        self.record("get_mentions");
        Ok(self.mentions.lock().clone())
    }

    async fn list_chats(&self) -> Result<Vec<ChatInfo>, Error> {
        self.record("list_chats");
        Ok(self.chats.lock().values().cloned().collect())
    }

    async fn download_media(&self, _message: &InboundMessage) -> Result<Option<MediaBlob>, Error> {
        self.record("download_media");
        Ok(self.media.lock().clone())
    }
}

type ConnectionSetup = Box<dyn Fn(&FakeConnection) + Send + Sync>;

/// Hands out [`FakeConnection`]s and remembers them per session.
#[derive(Default)]
pub struct FakeConnectionFactory {
    connections: Mutex<HashMap<i32, Arc<FakeConnection>>>,
    pub opened: AtomicUsize,
    pub fail_open: AtomicBool,
    /// Files present in the auth dir at the moment `open` ran.
    pub files_at_open: Mutex<HashMap<i32, Vec<PathBuf>>>,
    /// Files the "platform" writes into the auth dir when opened.
    pub auth_files: Mutex<Vec<(String, Vec<u8>)>>,
    setup: Mutex<Option<ConnectionSetup>>,
}

impl FakeConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs on every connection right after it is created.
    pub fn on_open(&self, f: impl Fn(&FakeConnection) + Send + Sync + 'static) {
        *self.setup.lock() = Some(Box::new(f));
    }

    pub fn connection(&self, session_id: i32) -> Option<Arc<FakeConnection>> {
        self.connections.lock().get(&session_id).cloned()
    }
}

fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&d) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(rel) = path.strip_prefix(dir) {
                out.push(rel.to_path_buf());
            }
        }
    }
    out.sort();
    out
}

#[async_trait]
impl ConnectionFactory for FakeConnectionFactory {
    async fn open(
        &self,
        session_id: i32,
        auth_dir: &Path,
        events: UnboundedSender<ConnectionEvent>,
    ) -> Result<Arc<dyn PlatformConnection>, Error> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::Platform("open refused".into()));
        }
        self.files_at_open.lock().insert(session_id, list_files(auth_dir));

        for (rel, bytes) in self.auth_files.lock().iter() {
            let path = auth_dir.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, bytes)?;
        }

        let conn = Arc::new(FakeConnection::new(session_id, events));
        if let Some(setup) = self.setup.lock().as_ref() {
            setup(&conn);
        }
        self.connections.lock().insert(session_id, Arc::clone(&conn));
        Ok(conn)
    }
}

/// One recorded POST.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub body: Value,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

type RequestHook = Arc<dyn Fn(&RecordedRequest) + Send + Sync>;

/// HttpClient that records every request and answers from a per-URL script
/// (default: 200 with an empty body). URLs marked unreachable return a
/// transport error.
#[derive(Default)]
pub struct RecordingHttpClient {
    pub requests: Mutex<Vec<RecordedRequest>>,
    responses: Mutex<HashMap<String, HttpResponse>>,
    unreachable: Mutex<Vec<String>>,
    on_request: Mutex<Option<RequestHook>>,
}

impl RecordingHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.responses.lock().insert(
            url.to_string(),
            HttpResponse { status, body: body.to_string() },
        );
    }

    pub fn unreachable(&self, url: &str) {
        self.unreachable.lock().push(url.to_string());
    }

    /// Run `f` as each request arrives, before it is answered.
    pub fn on_request(&self, f: impl Fn(&RecordedRequest) + Send + Sync + 'static) {
        *self.on_request.lock() = Some(Arc::new(f));
    }

    pub fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
        self.requests.lock().iter().filter(|r| r.url == url).cloned().collect()
    }
}

#[async_trait]
impl HttpClient for RecordingHttpClient {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        headers: Vec<(String, String)>,
    ) -> Result<HttpResponse, Error> {
        let request = RecordedRequest {
            url: url.to_string(),
            body: body.clone(),
            headers,
        };
        let hook = self.on_request.lock().clone();
        if let Some(hook) = hook {
            hook(&request);
        }
        self.requests.lock().push(request);
        if self.unreachable.lock().iter().any(|u| u == url) {
            return Err(Error::Webhook(format!("connection refused: {}", url)));
        }
        Ok(self
            .responses
            .lock()
            .get(url)
            .cloned()
            .unwrap_or(HttpResponse { status: 200, body: String::new() }))
    }
}
