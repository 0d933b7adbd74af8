pub mod typing;

pub use typing::{TypingRecord, TypingTracker};
