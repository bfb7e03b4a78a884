use tracing::debug;
use uuid::Uuid;

use crate::media::{MediaTrack, TrackKind};

/// The single stream handed to the encoder: exactly one video track plus
/// zero or more audio tracks.
#[derive(Debug, Clone)]
pub struct ComposedStream {
    id: Uuid,
    video: MediaTrack,
    audio: Vec<MediaTrack>,
}

impl ComposedStream {
    pub fn new(video: MediaTrack, audio: Vec<MediaTrack>) -> Self {
        debug_assert_eq!(video.kind(), TrackKind::Video);
        debug_assert!(audio.iter().all(|t| t.kind() == TrackKind::Audio));
        Self {
            id: Uuid::new_v4(),
            video,
            audio,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn video_track(&self) -> &MediaTrack {
        &self.video
    }

    pub fn audio_tracks(&self) -> &[MediaTrack] {
        &self.audio
    }

    /// All tracks, video first
    pub fn tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        std::iter::once(&self.video).chain(self.audio.iter())
    }

    pub fn video_track_count(&self) -> usize {
        1
    }

    pub fn audio_track_count(&self) -> usize {
        self.audio.len()
    }

    /// True while any constituent track is live
    pub fn is_live(&self) -> bool {
        self.tracks().any(|t| t.is_live())
    }

    /// Stop every constituent track. Idempotent.
    pub fn stop_all(&self) {
        let stopped = self.tracks().filter(|t| t.stop()).count();
        debug!("Composed stream {} stopped ({} live tracks)", self.id, stopped);
    }
}
