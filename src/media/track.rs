//! Live media tracks
//!
//! A track is the unit the compositor and the encoder consume. Clones share
//! liveness: stopping any clone ends the track for every holder, which is how
//! a hardware handle behaves once released.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use super::frame::{AudioFrame, VideoFrame};

/// Audio frames buffered per subscriber before the oldest are dropped
const AUDIO_FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Liveness of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    Live,
    Ended,
}

/// Declared (negotiated) properties of a video track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

#[derive(Debug)]
struct TrackShared {
    state: watch::Sender<TrackState>,
}

impl TrackShared {
    fn new() -> Arc<Self> {
        let (state, _) = watch::channel(TrackState::Live);
        Arc::new(Self { state })
    }

    fn is_live(&self) -> bool {
        *self.state.borrow() == TrackState::Live
    }

    /// Returns true if this call performed the transition
    fn end(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = TrackState::Ended;
                true
            } else {
                false
            }
        })
    }
}

#[derive(Clone)]
enum TrackFeed {
    Video {
        frames: watch::Receiver<Option<VideoFrame>>,
        settings: VideoSettings,
    },
    Audio {
        frames: broadcast::Sender<AudioFrame>,
    },
}

/// A live audio or video feed
#[derive(Clone)]
pub struct MediaTrack {
    id: Uuid,
    label: String,
    shared: Arc<TrackShared>,
    feed: TrackFeed,
}

impl MediaTrack {
    /// Create a video track and the writer its producer feeds frames through
    pub fn video(label: impl Into<String>, settings: VideoSettings) -> (Self, VideoTrackWriter) {
        let shared = TrackShared::new();
        let (tx, rx) = watch::channel(None);

        let track = Self {
            id: Uuid::new_v4(),
            label: label.into(),
            shared: Arc::clone(&shared),
            feed: TrackFeed::Video {
                frames: rx,
                settings,
            },
        };

        (track, VideoTrackWriter { frames: tx, shared })
    }

    /// Create an audio track and the writer its producer feeds frames through
    pub fn audio(label: impl Into<String>) -> (Self, AudioTrackWriter) {
        let shared = TrackShared::new();
        let (tx, _) = broadcast::channel(AUDIO_FEED_CAPACITY);

        let track = Self {
            id: Uuid::new_v4(),
            label: label.into(),
            shared: Arc::clone(&shared),
            feed: TrackFeed::Audio { frames: tx.clone() },
        };

        (track, AudioTrackWriter { frames: tx, shared })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> TrackKind {
        match self.feed {
            TrackFeed::Video { .. } => TrackKind::Video,
            TrackFeed::Audio { .. } => TrackKind::Audio,
        }
    }

    pub fn state(&self) -> TrackState {
        *self.shared.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.shared.is_live()
    }

    /// Stop the track, releasing the underlying capture handle.
    ///
    /// Idempotent: stopping an ended track is a no-op. Returns true if this
    /// call ended the track.
    pub fn stop(&self) -> bool {
        self.shared.end()
    }

    /// Resolve once the track has ended, whoever ended it
    pub async fn ended(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|state| *state == TrackState::Ended).await;
    }

    pub fn video_settings(&self) -> Option<VideoSettings> {
        match &self.feed {
            TrackFeed::Video { settings, .. } => Some(*settings),
            TrackFeed::Audio { .. } => None,
        }
    }

    /// Most recent frame of a video track ("current data")
    pub fn latest_frame(&self) -> Option<VideoFrame> {
        match &self.feed {
            TrackFeed::Video { frames, .. } => frames.borrow().clone(),
            TrackFeed::Audio { .. } => None,
        }
    }

    /// Watch handle over a video track's frames
    pub fn frame_receiver(&self) -> Option<watch::Receiver<Option<VideoFrame>>> {
        match &self.feed {
            TrackFeed::Video { frames, .. } => Some(frames.clone()),
            TrackFeed::Audio { .. } => None,
        }
    }

    /// Wait until a video track has produced its first frame.
    ///
    /// Returns false for audio tracks or if the producer went away first.
    pub async fn wait_for_frame(&self) -> bool {
        match &self.feed {
            TrackFeed::Video { frames, .. } => {
                let mut rx = frames.clone();
                let ready = rx.wait_for(|frame| frame.is_some()).await.is_ok();
                ready
            }
            TrackFeed::Audio { .. } => false,
        }
    }

    /// Subscribe to an audio track's frames
    pub fn subscribe_audio(&self) -> Option<broadcast::Receiver<AudioFrame>> {
        match &self.feed {
            TrackFeed::Audio { frames } => Some(frames.subscribe()),
            TrackFeed::Video { .. } => None,
        }
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("kind", &self.kind())
            .field("state", &self.state())
            .finish()
    }
}

/// Producer half of a video track
#[derive(Debug)]
pub struct VideoTrackWriter {
    frames: watch::Sender<Option<VideoFrame>>,
    shared: Arc<TrackShared>,
}

impl VideoTrackWriter {
    pub fn is_live(&self) -> bool {
        self.shared.is_live()
    }

    /// Publish a frame. Returns false once the track has ended.
    pub fn push(&self, frame: VideoFrame) -> bool {
        if !self.is_live() {
            return false;
        }
        self.frames.send_replace(Some(frame));
        true
    }

    /// End the track from the producer side (device unplugged, sharing stopped)
    pub fn end(&self) {
        self.shared.end();
    }
}

/// Producer half of an audio track
#[derive(Debug)]
pub struct AudioTrackWriter {
    frames: broadcast::Sender<AudioFrame>,
    shared: Arc<TrackShared>,
}

impl AudioTrackWriter {
    pub fn is_live(&self) -> bool {
        self.shared.is_live()
    }

    /// Publish a frame. Returns false once the track has ended.
    pub fn push(&self, frame: AudioFrame) -> bool {
        if !self.is_live() {
            return false;
        }
        // No subscribers is not an error: nobody is recording yet
        let _ = self.frames.send(frame);
        true
    }

    pub fn end(&self) {
        self.shared.end();
    }
}
