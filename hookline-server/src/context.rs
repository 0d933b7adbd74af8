//! hookline-server/src/context.rs
//!
//! Builds the service graph (ServerContext) for the gateway.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use hookline_common::traits::{MessageRepository, SessionRepository, WebhookRepository};
use hookline_core::cache::TypingTracker;
use hookline_core::eventbus::EventBus;
use hookline_core::platforms::{BridgeConnectionFactory, SessionManager};
use hookline_core::repositories::postgres::{
    PostgresMessageRepository, PostgresSessionRepository, PostgresWebhookRepository,
};
use hookline_core::services::{FsMediaStore, MessageSender, MessageService, WebhookService};
use hookline_core::{Database, DefaultHttpClient, Error, HttpClient, RuntimeConfig};

use crate::api::AppState;
use crate::Args;

/// Everything the server owns for its lifetime.
pub struct ServerContext {
    pub db: Database,
    pub event_bus: EventBus,
    pub manager: SessionManager,
    pub bridge: Arc<BridgeConnectionFactory>,
    pub message_service: Arc<MessageService>,
    pub state: AppState,
}

impl ServerContext {
    pub async fn new(args: &Args) -> Result<Self, Error> {
        info!("Using Postgres DB URL: {}", args.database_url);
        let db = Database::new(&args.database_url).await?;
        db.migrate().await?;

        let config = RuntimeConfig {
            auth_data_dir: PathBuf::from(&args.auth_data_dir),
            media_dir: PathBuf::from(&args.media_dir),
            max_snapshot_bytes: args.max_snapshot_bytes,
            webhook_timeout: Duration::from_secs(args.webhook_timeout_secs),
            ..RuntimeConfig::default()
        };

        let sessions: Arc<dyn SessionRepository> =
            Arc::new(PostgresSessionRepository::new(db.pool().clone()));
        let webhooks: Arc<dyn WebhookRepository> =
            Arc::new(PostgresWebhookRepository::new(db.pool().clone()));
        let messages: Arc<dyn MessageRepository> =
            Arc::new(PostgresMessageRepository::new(db.pool().clone()));

        let http: Arc<dyn HttpClient> = Arc::new(DefaultHttpClient::with_timeout(config.webhook_timeout)?);
        let bridge = Arc::new(BridgeConnectionFactory::new(args.bridge_url.clone(), http.clone()));

        let event_bus = EventBus::new();
        let typing = Arc::new(TypingTracker::new(config.typing_stale_after));
        let manager = SessionManager::new(
            sessions.clone(),
            bridge.clone(),
            event_bus.clone(),
            typing,
            config.clone(),
        );

        let sender = Arc::new(MessageSender::new(manager.clone(), messages.clone()));
        let webhook_service = Arc::new(WebhookService::new(
            http,
            messages.clone(),
            sender.clone(),
            config.webhook_user_agent.clone(),
        ));
        let message_service = Arc::new(MessageService::new(
            manager.clone(),
            sessions.clone(),
            webhooks.clone(),
            messages,
            Arc::new(FsMediaStore::new(config.media_dir.clone())),
            webhook_service,
        ));

        let state = AppState {
            sessions,
            webhooks,
            manager: manager.clone(),
            sender,
            message_service: message_service.clone(),
            bridge: Some(bridge.clone()),
        };

        Ok(Self {
            db,
            event_bus,
            manager,
            bridge,
            message_service,
            state,
        })
    }
}
