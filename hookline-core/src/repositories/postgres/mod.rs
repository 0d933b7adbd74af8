// src/repositories/postgres/mod.rs

pub mod session;
pub mod webhook;
pub mod message;

pub use session::PostgresSessionRepository;
pub use webhook::PostgresWebhookRepository;
pub use message::PostgresMessageRepository;

use crate::Error;

/// Turn a unique-constraint violation into `Error::Duplicate`, pass everything else through.
pub(crate) fn map_unique_violation(e: sqlx::Error, what: &str) -> Error {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return Error::Duplicate(format!("{} ({})", what, db_err.message()));
        }
    }
    Error::Database(e)
}
