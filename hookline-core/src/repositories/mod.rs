// src/repositories/mod.rs

pub use hookline_common::traits::repository_traits::{
    MessageRepository, SessionRepository, WebhookRepository,
};

pub use postgres::session::PostgresSessionRepository;
pub use postgres::webhook::PostgresWebhookRepository;
pub use postgres::message::PostgresMessageRepository;

pub mod postgres;
