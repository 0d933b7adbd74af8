// File: hookline-core/src/tasks/autostart.rs

use tracing::{error, info};

use crate::platforms::SessionManager;
use crate::Error;

/// Called once at startup: every session that was connected or still
/// connecting when the process last stopped is initialized again. A session
/// that fails to come back is logged and left disconnected.
pub async fn run_autostart(manager: &SessionManager) -> Result<usize, Error> {
    match manager.initialize_all().await {
        Ok(0) => {
            info!("Autostart: no sessions to restore");
            Ok(0)
        }
        Ok(n) => {
            info!("Autostart: restored {} session(s)", n);
            Ok(n)
        }
        Err(e) => {
            error!("Autostart: could not list sessions to restore: {}", e);
            Err(e)
        }
    }
}
