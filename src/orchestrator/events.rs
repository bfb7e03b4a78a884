use serde::Serialize;

use crate::compositor::CompositionConfig;
use crate::error::Notice;
use crate::media::AudioInputDevice;
use crate::recorder::{Artifact, RecordingState};

/// Notifications published by the [`Recorder`](super::Recorder)
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecorderEvent {
    StateChanged { state: RecordingState },
    /// User-facing message (toast)
    Notice(Notice),
    ArtifactReady { bytes: usize, mime_type: String },
    /// The recording was aborted and its data discarded
    Failed(Notice),
}

/// Summary of the finalized recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    pub size: usize,
    pub mime_type: String,
    pub chunks: usize,
}

impl From<&Artifact> for ArtifactInfo {
    fn from(artifact: &Artifact) -> Self {
        Self {
            size: artifact.len(),
            mime_type: artifact.mime_type().to_string(),
            chunks: artifact.chunk_count(),
        }
    }
}

/// Snapshot of everything the UI layer renders
#[derive(Debug, Clone, Serialize)]
pub struct RecorderStatus {
    pub state: RecordingState,
    pub seconds: u64,
    pub formatted_time: String,
    pub settings: CompositionConfig,
    pub audio_devices: Vec<AudioInputDevice>,
    /// Whether a webcam preview stream is open
    pub webcam_live: bool,
    pub artifact: Option<ArtifactInfo>,
}
