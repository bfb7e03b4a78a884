use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::track::{MediaTrack, TrackKind};

/// What a media source captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Screen,
    Webcam,
    Microphone,
    SystemAudio,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Screen => "screen",
            SourceKind::Webcam => "webcam",
            SourceKind::Microphone => "microphone",
            SourceKind::SystemAudio => "system-audio",
        };
        f.write_str(name)
    }
}

/// An acquired capture handle.
///
/// Owns the hardware/permission handle behind its tracks. `release` stops
/// every track and may be called any number of times; a source dropped
/// without being released is released on drop so no exit path leaks an
/// open camera or microphone.
#[derive(Debug)]
pub struct MediaSource {
    id: Uuid,
    kind: SourceKind,
    tracks: Vec<MediaTrack>,
    released: bool,
}

impl MediaSource {
    pub fn new(kind: SourceKind, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            tracks,
            released: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn first_video_track(&self) -> Option<&MediaTrack> {
        self.video_tracks().next()
    }

    /// True while any track is live
    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop all tracks. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        let stopped = self.tracks.iter().filter(|t| t.stop()).count();
        self.released = true;
        debug!(
            "Released {} source {} ({} of {} tracks were live)",
            self.kind,
            self.id,
            stopped,
            self.tracks.len()
        );
    }
}

impl Drop for MediaSource {
    fn drop(&mut self) {
        if !self.released {
            warn!("{} source {} dropped without release", self.kind, self.id);
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::track::VideoSettings;

    #[test]
    fn test_release_twice_is_noop() {
        let (video, _writer) = MediaTrack::video("screen", VideoSettings::default());
        let (audio, _audio_writer) = MediaTrack::audio("system");
        let mut source = MediaSource::new(SourceKind::Screen, vec![video.clone(), audio]);

        assert!(source.is_live());
        source.release();
        source.release();
        assert!(source.is_released());
        assert!(!video.is_live());
    }

    #[test]
    fn test_drop_releases_tracks() {
        let (video, _writer) = MediaTrack::video("webcam", VideoSettings::default());
        {
            let _source = MediaSource::new(SourceKind::Webcam, vec![video.clone()]);
        }
        assert!(!video.is_live());
    }

    #[test]
    fn test_release_of_ended_source() {
        let (video, writer) = MediaTrack::video("screen", VideoSettings::default());
        writer.end();
        let mut source = MediaSource::new(SourceKind::Screen, vec![video]);
        assert!(!source.is_live());
        source.release();
        assert!(source.is_released());
    }
}
