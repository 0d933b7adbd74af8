// File: hookline-core/src/test_utils/mod.rs

pub mod fakes;
pub mod helpers;
pub mod memory;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hookline_common::traits::{MessageRepository, SessionRepository, WebhookRepository};

use crate::cache::TypingTracker;
use crate::config::RuntimeConfig;
use crate::eventbus::EventBus;
use crate::platforms::SessionManager;
use crate::services::{FsMediaStore, MessageSender, MessageService, WebhookService};

pub use fakes::{FakeConnection, FakeConnectionFactory, RecordingHttpClient, FAKE_SELF_ID};
pub use memory::{InMemoryMessageRepository, InMemorySessionRepository, InMemoryWebhookRepository};

/// The full service graph wired to in-memory repositories and fakes.
pub struct TestHarness {
    pub sessions: Arc<InMemorySessionRepository>,
    pub webhooks: Arc<InMemoryWebhookRepository>,
    pub messages: Arc<InMemoryMessageRepository>,
    pub factory: Arc<FakeConnectionFactory>,
    pub http: Arc<RecordingHttpClient>,
    pub event_bus: EventBus,
    pub config: RuntimeConfig,
    pub manager: SessionManager,
    pub sender: Arc<MessageSender>,
    pub webhook_service: Arc<WebhookService>,
    pub message_service: Arc<MessageService>,
}

impl TestHarness {
    /// `root` holds the auth and media directories; typing delay defaults to zero.
    pub fn new(root: &Path) -> Self {
        let config = RuntimeConfig {
            auth_data_dir: root.join("auth"),
            media_dir: root.join("media"),
            default_typing_delay: Duration::ZERO,
            ..RuntimeConfig::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let sessions = Arc::new(InMemorySessionRepository::new());
        let webhooks = Arc::new(InMemoryWebhookRepository::new());
        let messages = Arc::new(InMemoryMessageRepository::new());
        let factory = Arc::new(FakeConnectionFactory::new());
        let http = Arc::new(RecordingHttpClient::new());
        let event_bus = EventBus::new();
        let typing = Arc::new(TypingTracker::new(config.typing_stale_after));

        let manager = SessionManager::new(
            sessions.clone() as Arc<dyn SessionRepository>,
            factory.clone(),
            event_bus.clone(),
            typing,
            config.clone(),
        );
        let sender = Arc::new(MessageSender::new(
            manager.clone(),
            messages.clone() as Arc<dyn MessageRepository>,
        ));
        let webhook_service = Arc::new(WebhookService::new(
            http.clone(),
            messages.clone(),
            sender.clone(),
            config.webhook_user_agent.clone(),
        ));
        let message_service = Arc::new(MessageService::new(
            manager.clone(),
            sessions.clone(),
            webhooks.clone() as Arc<dyn WebhookRepository>,
            messages.clone(),
            Arc::new(FsMediaStore::new(config.media_dir.clone())),
            webhook_service.clone(),
        ));

        Self {
            sessions,
            webhooks,
            messages,
            factory,
            http,
            event_bus,
            config,
            manager,
            sender,
            webhook_service,
            message_service,
        }
    }
}

/// Poll `check` until it holds or two seconds pass. Returns the final result.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
