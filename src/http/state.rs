use crate::orchestrator::Recorder;
use crate::upload::Uploader;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub recorder: Recorder,
    /// Where `POST /recording/download` writes artifacts
    pub downloads_dir: Arc<PathBuf>,
    pub uploader: Arc<Uploader>,
}

impl AppState {
    pub fn new(
        recorder: Recorder,
        downloads_dir: impl Into<PathBuf>,
        uploader: Arc<Uploader>,
    ) -> Self {
        Self {
            recorder,
            downloads_dir: Arc::new(downloads_dir.into()),
            uploader,
        }
    }
}
