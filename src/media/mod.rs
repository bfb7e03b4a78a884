//! Device sources
//!
//! Live tracks, owned capture handles, and the provider seam that acquires
//! them from the platform.

pub mod frame;
pub mod provider;
pub mod source;
pub mod synthetic;
pub mod track;

pub use frame::{AudioFrame, AudioStreamSource, VideoFrame};
pub use provider::{
    AudioInputDevice, DeviceProvider, DisplaySurface, FacingMode, MicrophoneConstraints,
    ScreenConstraints, WebcamConstraints,
};
pub use source::{MediaSource, SourceKind};
pub use synthetic::{SyntheticConfig, SyntheticDevices};
pub use track::{
    AudioTrackWriter, MediaTrack, TrackKind, TrackState, VideoSettings, VideoTrackWriter,
};
