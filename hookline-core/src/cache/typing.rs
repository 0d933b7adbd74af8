// File: hookline-core/src/cache/typing.rs

use std::collections::HashMap;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

pub const DEFAULT_TYPING_STALE_AFTER: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypingRecord {
    pub is_typing: bool,
    pub updated_at: Instant,
}

/// Per-session map of chat id => last typing state.
///
/// Nothing sweeps this map. A "typing" record older than `stale_after` is
/// flipped to not-typing the next time somebody reads it.
pub struct TypingTracker {
    sessions: DashMap<i32, HashMap<String, TypingRecord>>,
    stale_after: Duration,
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_STALE_AFTER)
    }
}

impl TypingTracker {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            stale_after,
        }
    }

    pub fn set_typing(&self, session_id: i32, chat_id: &str, is_typing: bool) {
        if chat_id.is_empty() {
            return;
        }
        self.sessions
            .entry(session_id)
            .or_default()
            .insert(
                chat_id.to_string(),
                TypingRecord {
                    is_typing,
                    updated_at: Instant::now(),
                },
            );
    }

    pub fn is_typing(&self, session_id: i32, chat_id: &str) -> bool {
        let Some(mut chats) = self.sessions.get_mut(&session_id) else {
            return false;
        };
        let Some(record) = chats.get_mut(chat_id) else {
            return false;
        };
        if !record.is_typing {
            return false;
        }
        let now = Instant::now();
        if now.duration_since(record.updated_at) > self.stale_after {
            *record = TypingRecord {
                is_typing: false,
                updated_at: now,
            };
            return false;
        }
        true
    }

    /// Forget everything about a session (disconnect / close).
    pub fn clear_session(&self, session_id: i32) {
        self.sessions.remove(&session_id);
    }

    pub fn tracked_chats(&self, session_id: i32) -> usize {
        self.sessions.get(&session_id).map(|m| m.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn typing_expires_after_threshold() {
        let tracker = TypingTracker::default();
        tracker.set_typing(1, "111@c.us", true);
        assert!(tracker.is_typing(1, "111@c.us"));

        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(tracker.is_typing(1, "111@c.us"), "exactly 15s is not stale yet");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!tracker.is_typing(1, "111@c.us"));
        // the stale read rewrote the record
        assert!(!tracker.is_typing(1, "111@c.us"));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_keeps_typing_alive() {
        let tracker = TypingTracker::default();
        tracker.set_typing(1, "c", true);
        tokio::time::advance(Duration::from_secs(10)).await;
        tracker.set_typing(1, "c", true);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(tracker.is_typing(1, "c"));
    }

    #[test]
    fn stop_typing_and_unknown_chats() {
        let tracker = TypingTracker::default();
        assert!(!tracker.is_typing(3, "nobody"));
        tracker.set_typing(3, "c", true);
        tracker.set_typing(3, "c", false);
        assert!(!tracker.is_typing(3, "c"));
        tracker.set_typing(3, "", true);
        assert_eq!(tracker.tracked_chats(3), 1);
    }

    #[test]
    fn sessions_are_isolated_and_clearable() {
        let tracker = TypingTracker::default();
        tracker.set_typing(1, "c", true);
        tracker.set_typing(2, "c", true);
        tracker.clear_session(1);
        assert!(!tracker.is_typing(1, "c"));
        assert!(tracker.is_typing(2, "c"));
    }
}
