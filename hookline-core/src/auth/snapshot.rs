//! src/auth/snapshot.rs
//!
//! Captures a session's on-disk authentication directory as a versioned JSON
//! blob stored on the `sessions` row, so that a session which has shown a QR
//! code but not yet been confirmed can resume after a process restart.
//!
//! Blob layout:
//! ```json
//! { "version": 1,
//!   "entries": [ { "type": "dir",  "path": "Default" },
//!                { "type": "file", "path": "Default/Cookies", "data": "<base64>" } ] }
//! ```

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use hookline_common::models::SessionUpdate;
use hookline_common::traits::repository_traits::SessionRepository;
use crate::Error;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSnapshot {
    pub version: u32,
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SnapshotEntry {
    Dir { path: String },
    File { path: String, data: String },
}

impl SnapshotEntry {
    pub fn path(&self) -> &str {
        match self {
            SnapshotEntry::Dir { path } | SnapshotEntry::File { path, .. } => path,
        }
    }
}

impl AuthSnapshot {
    /// Size of the blob as it would be stored.
    pub fn encoded_len(&self) -> Result<usize, Error> {
        Ok(serde_json::to_vec(self)?.len())
    }

    pub fn to_value(&self) -> Result<Value, Error> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Walk `dir` and capture every sub-directory and file.
///
/// Returns `Ok(None)` when the directory is missing or has nothing in it.
/// Symlinks are skipped.
pub async fn serialize_dir(dir: &Path) -> Result<Option<AuthSnapshot>, Error> {
    match tokio::fs::metadata(dir).await {
        Ok(m) if m.is_dir() => {}
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let mut entries = Vec::new();
    let mut stack: Vec<(PathBuf, String)> = vec![(dir.to_path_buf(), String::new())];

    while let Some((abs, rel)) = stack.pop() {
        let mut rd = tokio::fs::read_dir(&abs).await?;
        while let Some(child) = rd.next_entry().await? {
            let name = child.file_name().to_string_lossy().into_owned();
            let child_rel = if rel.is_empty() { name } else { format!("{}/{}", rel, name) };
            let ft = child.file_type().await?;
            if ft.is_dir() {
                entries.push(SnapshotEntry::Dir { path: child_rel.clone() });
                stack.push((child.path(), child_rel));
            } else if ft.is_file() {
                let bytes = tokio::fs::read(child.path()).await?;
                entries.push(SnapshotEntry::File {
                    path: child_rel,
                    data: BASE64.encode(bytes),
                });
            }
        }
    }

    if entries.is_empty() {
        return Ok(None);
    }
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    Ok(Some(AuthSnapshot {
        version: SNAPSHOT_VERSION,
        entries,
    }))
}

/// Rebuild `dir` from a stored blob.
///
/// The directory is wiped first. On any problem (bad shape, unknown version,
/// unsafe path, bad base64, I/O failure) the directory is removed again and
/// `false` is returned: the caller must start fresh.
pub async fn restore_dir(dir: &Path, blob: &Value) -> bool {
    let snapshot = match decode_snapshot(blob) {
        Ok(s) => s,
        Err(e) => {
            warn!("Auth snapshot for {:?} rejected: {}", dir, e);
            remove_dir_quietly(dir).await;
            return false;
        }
    };

    match replay(dir, &snapshot).await {
        Ok(()) => {
            debug!("Restored {} auth entries into {:?}", snapshot.entries.len(), dir);
            true
        }
        Err(e) => {
            warn!("Auth snapshot restore into {:?} failed partway: {}", dir, e);
            remove_dir_quietly(dir).await;
            false
        }
    }
}

fn decode_snapshot(blob: &Value) -> Result<AuthSnapshot, Error> {
    if !blob.is_object() {
        return Err(Error::Parse("snapshot is not an object".into()));
    }
    let snapshot: AuthSnapshot = serde_json::from_value(blob.clone())?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(Error::Parse(format!("unsupported snapshot version {}", snapshot.version)));
    }
    for entry in &snapshot.entries {
        if !is_safe_relative(entry.path()) {
            return Err(Error::Parse(format!("unsafe snapshot path '{}'", entry.path())));
        }
    }
    Ok(snapshot)
}

/// Only plain relative components: no root, no drive prefix, no `..`.
fn is_safe_relative(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

async fn replay(dir: &Path, snapshot: &AuthSnapshot) -> Result<(), Error> {
    remove_dir_quietly(dir).await;
    tokio::fs::create_dir_all(dir).await?;

    for entry in &snapshot.entries {
        match entry {
            SnapshotEntry::Dir { path } => {
                tokio::fs::create_dir_all(dir.join(path)).await?;
            }
            SnapshotEntry::File { path, data } => {
                let target = dir.join(path);
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let bytes = BASE64.decode(data)?;
                tokio::fs::write(&target, bytes).await?;
            }
        }
    }
    Ok(())
}

async fn remove_dir_quietly(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {:?}: {}", dir, e);
        }
    }
}

/// Moves auth snapshots between disk and the `sessions.session_data` column.
///
/// Persistence failures are logged, never returned: a session keeps running
/// without durable resume capability.
#[derive(Clone)]
pub struct AuthSnapshotStore {
    sessions: Arc<dyn SessionRepository>,
    max_snapshot_bytes: usize,
}

impl AuthSnapshotStore {
    pub fn new(sessions: Arc<dyn SessionRepository>, max_snapshot_bytes: usize) -> Self {
        Self {
            sessions,
            max_snapshot_bytes,
        }
    }

    pub async fn serialize(&self, dir: &Path) -> Result<Option<AuthSnapshot>, Error> {
        serialize_dir(dir).await
    }

    pub async fn restore(&self, dir: &Path, blob: &Value) -> bool {
        restore_dir(dir, blob).await
    }

    pub async fn persist(&self, session_id: i32, snapshot: &AuthSnapshot) -> bool {
        let value = match snapshot.to_value() {
            Ok(v) => v,
            Err(e) => {
                warn!("Session {}: could not encode auth snapshot: {}", session_id, e);
                return false;
            }
        };
        let update = SessionUpdate::default().with_session_data(Some(value));
        match self.sessions.update_state(session_id, &update).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Session {}: failed to persist auth snapshot: {}", session_id, e);
                false
            }
        }
    }

    pub async fn clear(&self, session_id: i32) -> bool {
        let update = SessionUpdate::default().with_session_data(None);
        match self.sessions.update_state(session_id, &update).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Session {}: failed to clear auth snapshot: {}", session_id, e);
                false
            }
        }
    }

    /// Serialize `dir` and store it, unless it is empty or over the size bound.
    pub async fn persist_pending(&self, session_id: i32, dir: &Path) -> bool {
        let snapshot = match self.serialize(dir).await {
            Ok(Some(s)) => s,
            Ok(None) => {
                debug!("Session {}: auth dir empty, nothing to snapshot", session_id);
                return false;
            }
            Err(e) => {
                warn!("Session {}: failed to read auth dir {:?}: {}", session_id, dir, e);
                return false;
            }
        };

        match snapshot.encoded_len() {
            Ok(len) if len > self.max_snapshot_bytes => {
                warn!(
                    "Session {}: auth snapshot is {} bytes (limit {}), not persisting",
                    session_id, len, self.max_snapshot_bytes
                );
                return false;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Session {}: could not size auth snapshot: {}", session_id, e);
                return false;
            }
        }

        let stored = self.persist(session_id, &snapshot).await;
        if stored {
            info!("Session {}: stored auth snapshot ({} entries)", session_id, snapshot.entries.len());
        }
        stored
    }
}
