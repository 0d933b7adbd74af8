// File: hookline-core/src/platforms/manager.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hookline_common::models::chat::{is_group_address, GROUP_SUFFIX};
use hookline_common::models::event::STATE_CONNECTED;
use hookline_common::models::{ConnectionEvent, SessionStatus, SessionUpdate};
use hookline_common::traits::{ConnectionFactory, PlatformConnection, SessionRepository};

use crate::auth::AuthSnapshotStore;
use crate::cache::TypingTracker;
use crate::config::RuntimeConfig;
use crate::eventbus::{EventBus, HookEvent};
use crate::platforms::qr;
use crate::platforms::views::{
    chat_summary, group_summary, participant_summary, sort_chats, sort_groups, ChatSummary,
    GroupSummary, ParticipantSummary,
};
use crate::Error;

/// Mirror of the persisted lifecycle columns plus the auth bookkeeping that
/// only matters while the connection is alive.
#[derive(Debug, Clone)]
pub struct RuntimeState {
    pub status: SessionStatus,
    pub last_seen: Option<DateTime<Utc>>,
    /// An auth snapshot was written for this connection attempt and not yet consumed.
    pub pending_auth_snapshot: bool,
    last_qr: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSessionInfo {
    pub id: i32,
    pub name: String,
    pub status: SessionStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub has_pending_auth: bool,
}

/// The live handle for one session.
pub struct RuntimeSession {
    pub session_id: i32,
    pub session_name: String,
    connection: Arc<dyn PlatformConnection>,
    state: Mutex<RuntimeState>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl RuntimeSession {
    fn new(
        session_id: i32,
        session_name: String,
        connection: Arc<dyn PlatformConnection>,
        state: RuntimeState,
    ) -> Self {
        Self {
            session_id,
            session_name,
            connection,
            state: Mutex::new(state),
            event_task: Mutex::new(None),
        }
    }

    pub fn connection(&self) -> Arc<dyn PlatformConnection> {
        Arc::clone(&self.connection)
    }

    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_seen
    }

    pub fn has_pending_auth(&self) -> bool {
        self.state.lock().pending_auth_snapshot
    }

    pub fn info(&self) -> RuntimeSessionInfo {
        let st = self.state.lock();
        RuntimeSessionInfo {
            id: self.session_id,
            name: self.session_name.clone(),
            status: st.status,
            last_seen: st.last_seen,
            has_pending_auth: st.pending_auth_snapshot,
        }
    }

    fn mirror(&self, update: &SessionUpdate) {
        let mut st = self.state.lock();
        if let Some(s) = update.status {
            st.status = s;
        }
        if let Some(at) = update.last_seen {
            st.last_seen = Some(at);
        }
    }

    fn set_pending(&self, pending: bool) {
        self.state.lock().pending_auth_snapshot = pending;
    }

    /// Reset pending snapshot and cached QR, returning whether a snapshot was pending.
    fn take_pending_artifacts(&self) -> bool {
        let mut st = self.state.lock();
        let was = st.pending_auth_snapshot;
        st.pending_auth_snapshot = false;
        st.last_qr = None;
        was
    }

    fn cached_qr(&self) -> Option<String> {
        self.state.lock().last_qr.clone()
    }

    fn cache_qr(&self, url: String) {
        self.state.lock().last_qr = Some(url);
    }

    fn set_event_task(&self, handle: JoinHandle<()>) {
        *self.event_task.lock() = Some(handle);
    }

    fn stop_event_task(&self, abort: bool) {
        if let Some(handle) = self.event_task.lock().take() {
            if abort {
                handle.abort();
            }
        }
    }
}

enum LoopControl {
    Continue,
    Stop,
}

struct ManagerInner {
    sessions: Arc<dyn SessionRepository>,
    snapshots: AuthSnapshotStore,
    typing: Arc<TypingTracker>,
    factory: Arc<dyn ConnectionFactory>,
    event_bus: EventBus,
    config: RuntimeConfig,
    live: DashMap<i32, Arc<RuntimeSession>>,
    lifecycle_locks: DashMap<i32, Arc<tokio::sync::Mutex<()>>>,
}

/// Owns one live connection per session id and drives the
/// disconnected -> connecting -> connected state machine.
///
/// Start/stop/restart calls for the same session id are serialized through a
/// per-session lock; different sessions never wait on each other.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        factory: Arc<dyn ConnectionFactory>,
        event_bus: EventBus,
        typing: Arc<TypingTracker>,
        config: RuntimeConfig,
    ) -> Self {
        let snapshots = AuthSnapshotStore::new(Arc::clone(&sessions), config.max_snapshot_bytes);
        Self {
            inner: Arc::new(ManagerInner {
                sessions,
                snapshots,
                typing,
                factory,
                event_bus,
                config,
                live: DashMap::new(),
                lifecycle_locks: DashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn typing(&self) -> &Arc<TypingTracker> {
        &self.inner.typing
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    fn lifecycle_lock(&self, session_id: i32) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .lifecycle_locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn get_session(&self, session_id: i32) -> Option<Arc<RuntimeSession>> {
        self.inner.live.get(&session_id).map(|e| Arc::clone(e.value()))
    }

    pub fn get_all_sessions(&self) -> Vec<Arc<RuntimeSession>> {
        let mut all: Vec<_> = self.inner.live.iter().map(|e| Arc::clone(e.value())).collect();
        all.sort_by_key(|s| s.session_id);
        all
    }

    /// Live connection for a session, or `NotConnected`.
    pub fn connection(&self, session_id: i32) -> Result<Arc<dyn PlatformConnection>, Error> {
        self.get_session(session_id)
            .map(|rt| rt.connection())
            .ok_or(Error::NotConnected(session_id))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub async fn initialize_session(&self, session_id: i32) -> Result<Arc<RuntimeSession>, Error> {
        let lock = self.lifecycle_lock(session_id);
        let _guard = lock.lock().await;
        self.initialize_locked(session_id).await
    }

    async fn initialize_locked(&self, session_id: i32) -> Result<Arc<RuntimeSession>, Error> {
        if let Some(existing) = self.get_session(session_id) {
            info!("Session {} already initialized", session_id);
            return Ok(existing);
        }

        match self.open_session(session_id).await {
            Ok(rt) => Ok(rt),
            Err(e) => {
                error!("Error initializing session {}: {}", session_id, e);
                self.write_state(
                    session_id,
                    SessionUpdate::status(SessionStatus::Disconnected).with_qr(None),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn open_session(&self, session_id: i32) -> Result<Arc<RuntimeSession>, Error> {
        let session = self
            .inner
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;

        info!("Initializing session {} ({})", session_id, session.session_name);

        let auth_dir = self.inner.config.session_auth_dir(session_id);
        let mut pending = false;

        if let Some(blob) = session.session_data.as_ref().filter(|v| !v.is_null()) {
            if self.inner.snapshots.restore(&auth_dir, blob).await {
                info!("Session {}: restored pending auth state from snapshot", session_id);
                pending = true;
            } else {
                warn!("Session {}: stored auth snapshot unusable, starting fresh", session_id);
                self.inner.snapshots.clear(session_id).await;
            }
        }

        tokio::fs::create_dir_all(&auth_dir).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let connection = self.inner.factory.open(session_id, &auth_dir, tx).await?;

        // Written before the event loop runs so no lifecycle event can be overtaken.
        // A row that was connected keeps that status until the connection says otherwise.
        let status = if session.status == SessionStatus::Connected {
            session.status
        } else {
            self.write_state(session_id, SessionUpdate::status(SessionStatus::Connecting))
                .await;
            SessionStatus::Connecting
        };

        let runtime = Arc::new(RuntimeSession::new(
            session_id,
            session.session_name.clone(),
            Arc::clone(&connection),
            RuntimeState {
                status,
                last_seen: session.last_seen,
                pending_auth_snapshot: pending,
                last_qr: session.qr_code.clone(),
            },
        ));

        let task = tokio::spawn(run_event_loop(self.clone(), Arc::clone(&runtime), rx));
        runtime.set_event_task(task);
        self.inner.live.insert(session_id, Arc::clone(&runtime));

        if let Err(e) = connection.connect().await {
            self.discard_runtime(&runtime, true);
            if let Err(de) = connection.destroy().await {
                debug!("Session {}: destroy after failed connect: {}", session_id, de);
            }
            return Err(e);
        }

        Ok(runtime)
    }

    /// Tear down any live connection, clear the QR, and start over.
    pub async fn restart_session(&self, session_id: i32) -> Result<Arc<RuntimeSession>, Error> {
        let lock = self.lifecycle_lock(session_id);
        let _guard = lock.lock().await;

        if let Some(rt) = self.get_session(session_id) {
            if let Err(e) = rt.connection.destroy().await {
                warn!("Failed to destroy existing connection for session {}: {}", session_id, e);
            }
            self.discard_runtime(&rt, true);
        }

        self.inner
            .sessions
            .update_state(
                session_id,
                &SessionUpdate::status(SessionStatus::Connecting).with_qr(None),
            )
            .await?;

        info!("Restarting session {} to refresh QR code", session_id);
        self.initialize_locked(session_id).await
    }

    /// Stop a session and forget its auth snapshot.
    ///
    /// Returns whether a live connection existed. The row is marked
    /// disconnected either way; a failing destroy is re-raised after cleanup.
    pub async fn close_session(&self, session_id: i32) -> Result<bool, Error> {
        let lock = self.lifecycle_lock(session_id);
        let _guard = lock.lock().await;

        let reset = SessionUpdate::status(SessionStatus::Disconnected)
            .with_qr(None)
            .with_session_data(None);

        let Some(rt) = self.get_session(session_id) else {
            warn!("Session {} has no live connection; marking disconnected", session_id);
            self.inner.sessions.update_state(session_id, &reset).await?;
            self.publish_status(session_id, SessionStatus::Disconnected).await;
            return Ok(false);
        };

        let destroyed = rt.connection.destroy().await;
        self.discard_runtime(&rt, true);

        match destroyed {
            Ok(()) => {
                self.inner.sessions.update_state(session_id, &reset).await?;
                self.publish_status(session_id, SessionStatus::Disconnected).await;
                info!("Session {} closed successfully", session_id);
                Ok(true)
            }
            Err(e) => {
                error!("Error closing session {}: {}", session_id, e);
                self.write_state(
                    session_id,
                    SessionUpdate::status(SessionStatus::Disconnected).with_qr(None),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Bring back every session whose last persisted status was connected or
    /// connecting. Returns the number that initialized successfully.
    pub async fn initialize_all(&self) -> Result<usize, Error> {
        let candidates = self
            .inner
            .sessions
            .list_by_status(&[SessionStatus::Connected, SessionStatus::Connecting])
            .await?;
        info!("Restoring {} session(s) from previous run", candidates.len());

        let mut ok = 0;
        for session in candidates {
            match self.initialize_session(session.id).await {
                Ok(_) => ok += 1,
                Err(e) => error!("Failed to restore session {}: {}", session.id, e),
            }
        }
        Ok(ok)
    }

    /// Destroy every live connection without touching persisted status, so
    /// the next process start restores them.
    pub async fn shutdown(&self) {
        let all = self.get_all_sessions();
        info!("Shutting down {} live session(s)", all.len());
        for rt in all {
            if let Err(e) = rt.connection.destroy().await {
                warn!("Session {}: destroy during shutdown failed: {}", rt.session_id, e);
            }
            self.discard_runtime(&rt, true);
        }
    }

    /// Drop the handle from the registry if it is still the current one.
    fn discard_runtime(&self, runtime: &Arc<RuntimeSession>, abort_task: bool) {
        let id = runtime.session_id;
        let removed = self
            .inner
            .live
            .remove_if(&id, |_, current| Arc::ptr_eq(current, runtime))
            .is_some();
        if removed {
            self.inner.typing.clear_session(id);
        }
        runtime.stop_event_task(abort_task);
    }

    // ------------------------------------------------------------------
    // Chat queries
    // ------------------------------------------------------------------

    pub async fn get_session_chats(&self, session_id: i32) -> Result<Vec<ChatSummary>, Error> {
        let conn = self.connection(session_id)?;
        let chats = conn.list_chats().await?;
        let mut out: Vec<ChatSummary> = chats
            .iter()
            .map(|c| chat_summary(c, self.inner.typing.is_typing(session_id, &c.id)))
            .collect();
        sort_chats(&mut out);
        Ok(out)
    }

    pub async fn get_session_groups(&self, session_id: i32) -> Result<Vec<GroupSummary>, Error> {
        let conn = self.connection(session_id)?;
        let chats = conn.list_chats().await?;
        let mut out: Vec<GroupSummary> = chats
            .iter()
            .filter(|c| c.is_group)
            .map(group_summary)
            .collect();
        sort_groups(&mut out);
        Ok(out)
    }

    pub async fn get_group_participants(
        &self,
        session_id: i32,
        group_id: &str,
    ) -> Result<Vec<ParticipantSummary>, Error> {
        let conn = self.connection(session_id)?;
        let normalized = if is_group_address(group_id) {
            group_id.to_string()
        } else {
            format!("{}{}", group_id, GROUP_SUFFIX)
        };

        let chat = conn.get_chat(&normalized).await?;
        if !chat.is_group {
            return Err(Error::NotFound(format!(
                "group {} for session {}",
                group_id, session_id
            )));
        }
        if chat.participants.is_empty() {
            warn!("Group {} has no participant metadata loaded", normalized);
        }

        let mut out = Vec::with_capacity(chat.participants.len());
        for p in &chat.participants {
            let contact = match conn.get_contact(&p.id).await {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!("Unable to load contact {} in group {}: {}", p.id, normalized, e);
                    None
                }
            };
            out.push(participant_summary(p, contact.as_ref()));
        }
        out.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Event handling
    // ------------------------------------------------------------------

    /// Persist lifecycle columns and mirror them on the live handle. Failures are logged.
    async fn write_state(&self, session_id: i32, update: SessionUpdate) -> bool {
        let result = self.inner.sessions.update_state(session_id, &update).await;
        if let Some(rt) = self.get_session(session_id) {
            rt.mirror(&update);
        }
        match result {
            Ok(()) => {
                if let Some(status) = update.status {
                    self.publish_status(session_id, status).await;
                }
                true
            }
            Err(e) => {
                error!("Failed to update session {}: {}", session_id, e);
                false
            }
        }
    }

    async fn publish_status(&self, session_id: i32, status: SessionStatus) {
        self.inner
            .event_bus
            .publish(HookEvent::SessionStatusChanged { session_id, status })
            .await;
    }

    async fn clear_pending_artifacts(&self, runtime: &RuntimeSession) {
        if runtime.take_pending_artifacts() {
            self.inner.snapshots.clear(runtime.session_id).await;
        }
    }

    async fn mark_connected(&self, runtime: &RuntimeSession) {
        self.clear_pending_artifacts(runtime).await;
        let update = SessionUpdate::status(SessionStatus::Connected)
            .with_qr(None)
            .with_last_seen(Utc::now());
        runtime.mirror(&update);
        self.write_state(runtime.session_id, update).await;
    }

    async fn mark_lost(&self, runtime: &Arc<RuntimeSession>) {
        self.clear_pending_artifacts(runtime).await;
        let update = SessionUpdate::status(SessionStatus::Disconnected).with_qr(None);
        runtime.mirror(&update);
        self.write_state(runtime.session_id, update).await;
        self.discard_runtime(runtime, false);
    }

    async fn handle_qr(&self, runtime: &RuntimeSession, code: &str) {
        let id = runtime.session_id;
        if let Some(art) = qr::render_terminal(code) {
            debug!("QR code for session {}:\n{}", id, art);
        }

        if !runtime.has_pending_auth() {
            let dir = self.inner.config.session_auth_dir(id);
            if self.inner.snapshots.persist_pending(id, &dir).await {
                runtime.set_pending(true);
            }
        }

        let url = match runtime.cached_qr() {
            Some(u) => u,
            None => match qr::render_data_url(code) {
                Ok(u) => {
                    runtime.cache_qr(u.clone());
                    u
                }
                Err(e) => {
                    error!("Failed to render QR code for session {}: {}", id, e);
                    return;
                }
            },
        };

        let update = SessionUpdate::status(SessionStatus::Connecting).with_qr(Some(url));
        runtime.mirror(&update);
        if self.write_state(id, update).await {
            info!("QR code generated for session {}", id);
        }
    }

    async fn handle_event(&self, runtime: &Arc<RuntimeSession>, event: ConnectionEvent) -> LoopControl {
        let id = runtime.session_id;
        match event {
            ConnectionEvent::Qr { code } => {
                self.handle_qr(runtime, &code).await;
            }
            ConnectionEvent::Authenticated => {
                info!("Session {} authenticated", id);
                self.mark_connected(runtime).await;
            }
            ConnectionEvent::Ready => {
                info!("Session {} is ready", id);
                self.mark_connected(runtime).await;
            }
            ConnectionEvent::StateChanged { state } => {
                info!("Session {} state changed to {}", id, state);
                if state == STATE_CONNECTED {
                    self.mark_connected(runtime).await;
                }
            }
            ConnectionEvent::AuthFailure { reason } => {
                error!("Session {} authentication failed: {}", id, reason);
                self.mark_lost(runtime).await;
                return LoopControl::Stop;
            }
            ConnectionEvent::Disconnected { reason } => {
                info!("Session {} disconnected: {}", id, reason);
                self.mark_lost(runtime).await;
                return LoopControl::Stop;
            }
            ConnectionEvent::Message { message } => {
                if message.is_status_broadcast() {
                    debug!("Skipping status message for session {}", id);
                    return LoopControl::Continue;
                }
                let is_mention = if is_group_address(&message.from) {
                    match runtime.connection.get_mentions(&message).await {
                        Ok(mentions) => mentions.iter().any(|c| c.is_me),
                        Err(e) => {
                            warn!("Session {}: could not load mentions for {}: {}", id, message.id, e);
                            false
                        }
                    }
                } else {
                    false
                };
                self.inner.event_bus.publish_inbound(id, message, is_mention).await;
            }
            ConnectionEvent::MessageCreated { message } => {
                if message.from_me {
                    self.inner.event_bus.publish_inbound(id, message, false).await;
                }
            }
            ConnectionEvent::Typing { chat_id } => {
                self.inner.typing.set_typing(id, &chat_id, true);
            }
            ConnectionEvent::StopTyping { chat_id } => {
                self.inner.typing.set_typing(id, &chat_id, false);
            }
        }
        LoopControl::Continue
    }
}

async fn run_event_loop(
    manager: SessionManager,
    runtime: Arc<RuntimeSession>,
    mut rx: UnboundedReceiver<ConnectionEvent>,
) {
    debug!("Session {} event loop started", runtime.session_id);
    while let Some(event) = rx.recv().await {
        let name = event.name();
        match manager.handle_event(&runtime, event).await {
            LoopControl::Continue => {}
            LoopControl::Stop => {
                debug!("Session {} event loop stopping after '{}'", runtime.session_id, name);
                break;
            }
        }
    }
    debug!("Session {} event loop ended", runtime.session_id);
}
