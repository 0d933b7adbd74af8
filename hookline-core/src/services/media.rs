// File: hookline-core/src/services/media.rs
//
// Storage for media attached to inbound messages.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use tracing::info;

use hookline_common::models::MediaBlob;

use crate::Error;

/// Reference to a stored media asset, as handed to webhook dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMedia {
    /// Public path, `/media/session-{id}/{file}`.
    pub url: String,
    /// Base64 of the stored bytes.
    pub data: String,
    pub mimetype: String,
}

impl StoredMedia {
    pub fn is_image(&self) -> bool {
        self.mimetype.starts_with("image/")
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    async fn store(&self, session_id: i32, message_id: i64, blob: &MediaBlob) -> Result<StoredMedia, Error>;
}

/// `image/jpeg; codecs=x` -> `jpeg`; anything unparseable -> `dat`.
pub fn extension_for(mimetype: &str) -> String {
    mimetype
        .split_once('/')
        .map(|(_, sub)| sub.split(';').next().unwrap_or("").trim())
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            ext.chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-' || *c == '+')
                .collect::<String>()
        })
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "dat".to_string())
}

/// Writes media under `{media_dir}/session-{id}/{message_row_id}.{ext}`.
///
/// Bytes are stored as received; image resizing is left to whatever serves
/// the media directory.
pub struct FsMediaStore {
    media_dir: PathBuf,
}

impl FsMediaStore {
    pub fn new(media_dir: impl Into<PathBuf>) -> Self {
        Self { media_dir: media_dir.into() }
    }
}

#[async_trait]
impl MediaProcessor for FsMediaStore {
    async fn store(&self, session_id: i32, message_id: i64, blob: &MediaBlob) -> Result<StoredMedia, Error> {
        let folder = format!("session-{}", session_id);
        let dir = self.media_dir.join(&folder);
        tokio::fs::create_dir_all(&dir).await?;

        let bytes = BASE64.decode(blob.data.trim())?;
        let filename = format!("{}.{}", message_id, extension_for(&blob.mimetype));
        let path = dir.join(&filename);
        tokio::fs::write(&path, &bytes).await?;

        info!("Media saved for message {} at {}", message_id, path.display());

        Ok(StoredMedia {
            url: format!("/media/{}/{}", folder, filename),
            data: BASE64.encode(&bytes),
            mimetype: blob.mimetype.clone(),
        })
    }
}
