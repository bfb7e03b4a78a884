//! Persistence/upload collaborator
//!
//! [`Uploader`] guards an [`ArtifactStore`]: rate limit, type and size
//! checks, authentication, then object upload and metadata insert. The
//! recorder hands it the finalized artifact via [`Recorder::upload`].
//!
//! [`Recorder::upload`]: crate::orchestrator::Recorder::upload

pub mod guard;
pub mod store;

pub use guard::{is_allowed_type, sanitize_filename, RateLimiter, ALLOWED_TYPES};
pub use store::{ArtifactStore, MemoryStore, NewRecording, StoreError, StoredRecording};

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::Notice;
use crate::recorder::{codec::container_type, Artifact};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("you must be logged in to upload recordings")]
    NotAuthenticated,

    #[error("invalid file type {0}, only WebM, MP4 and Matroska videos are allowed")]
    InvalidType(String),

    #[error("file too large: {size} bytes (maximum {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("recording is empty")]
    Empty,

    #[error("no finalized recording to upload")]
    NoRecording,

    #[error("upload rate limit exceeded, try again in {} seconds", .retry_in.as_secs_f64().ceil())]
    RateLimited { retry_in: Duration },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl UploadError {
    /// Map to the message shown to the end user. Guard rejections carry
    /// their own text; storage failures stay generic.
    pub fn notice(&self) -> Notice {
        match self {
            UploadError::NotAuthenticated => {
                Notice::new("loginRequired", "Please sign in to upload recordings")
            }
            UploadError::NoRecording => {
                Notice::new("noRecording", "There is no recording to upload yet.")
            }
            UploadError::RateLimited { .. } => Notice::new("rateLimited", &self.to_string()),
            UploadError::InvalidType(_) | UploadError::TooLarge { .. } | UploadError::Empty => {
                Notice::new("uploadRejected", &self.to_string())
            }
            UploadError::Storage(_) => Notice::new("uploadFailed", "Failed to upload recording"),
        }
    }
}

/// Identifiers of an uploaded recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub id: Uuid,
    pub public_url: String,
    pub share_token: String,
    /// Viewing link built from the share token
    pub share_url: String,
}

/// Public viewing link for a share token
pub fn share_url(base: &str, share_token: &str) -> String {
    format!("{}/watch/{}", base.trim_end_matches('/'), share_token)
}

pub struct Uploader {
    store: Arc<dyn ArtifactStore>,
    limiter: RateLimiter,
    max_bytes: u64,
    share_base_url: String,
    progress: watch::Sender<u8>,
}

impl Uploader {
    pub fn new(store: Arc<dyn ArtifactStore>, config: &UploadConfig) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            store,
            limiter: RateLimiter::new(
                config.rate_limit,
                Duration::from_secs(config.rate_window_secs),
            ),
            max_bytes: config.max_bytes,
            share_base_url: config.share_base_url.clone(),
            progress,
        }
    }

    /// Upload progress in percent
    pub fn progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    pub async fn upload(
        &self,
        artifact: &Artifact,
        duration_seconds: Option<u64>,
    ) -> Result<UploadReceipt, UploadError> {
        self.progress.send_replace(0);

        if let Err(retry_in) = self.limiter.check() {
            warn!("Upload rate limit exceeded");
            return Err(UploadError::RateLimited { retry_in });
        }

        if !is_allowed_type(artifact.mime_type()) {
            warn!("Rejected upload of type {}", artifact.mime_type());
            return Err(UploadError::InvalidType(artifact.mime_type().to_string()));
        }

        let size = artifact.len() as u64;
        if size == 0 {
            return Err(UploadError::Empty);
        }
        if size > self.max_bytes {
            warn!("Rejected upload of {} bytes", size);
            return Err(UploadError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }

        let user_id = self
            .store
            .current_user()
            .await?
            .ok_or(UploadError::NotAuthenticated)?;

        let filename = sanitize_filename(&format!(
            "recording-{}.webm",
            Utc::now().timestamp_millis()
        ));
        let file_path = format!("{}/{}", user_id, filename);
        self.progress.send_replace(10);

        self.store
            .put_object(&file_path, artifact.bytes(), container_type(artifact.mime_type()))
            .await?;
        self.progress.send_replace(60);

        let public_url = self.store.public_url(&file_path);
        self.progress.send_replace(80);

        let stored = self
            .store
            .insert_record(NewRecording {
                filename,
                file_path: file_path.clone(),
                file_size: size,
                duration_seconds,
                public_url: public_url.clone(),
                user_id,
                is_public: true,
            })
            .await?;
        self.progress.send_replace(100);

        info!("Uploaded {} ({} bytes) as {}", file_path, size, stored.id);
        Ok(UploadReceipt {
            id: stored.id,
            public_url,
            share_url: share_url(&self.share_base_url, &stored.share_token),
            share_token: stored.share_token,
        })
    }
}
