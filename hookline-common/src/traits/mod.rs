pub mod repository_traits;
pub mod connection_traits;

pub use repository_traits::{MessageRepository, SessionRepository, WebhookRepository};
pub use connection_traits::{ConnectionFactory, PlatformConnection};
