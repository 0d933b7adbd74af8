// File: hookline-core/src/platforms/mod.rs

pub mod bridge;
pub mod manager;
pub mod qr;
pub mod views;

pub use bridge::BridgeConnectionFactory;
pub use manager::{RuntimeSession, RuntimeSessionInfo, SessionManager};
