// File: hookline-core/src/config.rs

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("Hookline/", env!("CARGO_PKG_VERSION"));

/// Runtime knobs shared by the session manager and the message services.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Root under which each session gets `session-{id}/`.
    pub auth_data_dir: PathBuf,
    /// Root under which inbound media is written as `session-{id}/{message}.{ext}`.
    pub media_dir: PathBuf,
    /// Largest encoded auth snapshot we are willing to store.
    pub max_snapshot_bytes: usize,
    /// A "typing" record older than this reads as not typing.
    pub typing_stale_after: Duration,
    pub default_typing_delay: Duration,
    pub max_typing_delay: Duration,
    pub webhook_timeout: Duration,
    pub webhook_user_agent: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            auth_data_dir: PathBuf::from(".hookline_auth"),
            media_dir: PathBuf::from("media"),
            max_snapshot_bytes: 8 * 1024 * 1024,
            typing_stale_after: Duration::from_secs(15),
            default_typing_delay: Duration::from_millis(1200),
            max_typing_delay: Duration::from_millis(5000),
            webhook_timeout: Duration::from_secs(30),
            webhook_user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn session_auth_dir(&self, session_id: i32) -> PathBuf {
        self.auth_data_dir.join(format!("session-{}", session_id))
    }

    pub fn session_media_dir(&self, session_id: i32) -> PathBuf {
        self.media_dir.join(format!("session-{}", session_id))
    }

    /// Caller override clamped to `[0, max_typing_delay]`.
    pub fn typing_delay(&self, requested_ms: Option<i64>) -> Duration {
        match requested_ms {
            None => self.default_typing_delay,
            Some(ms) if ms <= 0 => Duration::ZERO,
            Some(ms) => Duration::from_millis(ms as u64).min(self.max_typing_delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_delay_is_clamped() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.typing_delay(None), Duration::from_millis(1200));
        assert_eq!(cfg.typing_delay(Some(-50)), Duration::ZERO);
        assert_eq!(cfg.typing_delay(Some(300)), Duration::from_millis(300));
        assert_eq!(cfg.typing_delay(Some(60_000)), Duration::from_millis(5000));
    }

    #[test]
    fn session_dirs_are_namespaced() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.session_auth_dir(9).ends_with("session-9"));
        assert!(cfg.session_media_dir(7).ends_with("session-7"));
    }
}
