//! Recording engine
//!
//! Lifecycle state machine over an [`Encoder`], chunk accumulation, and
//! artifact finalization.

pub mod codec;
pub mod encoder;
pub mod engine;
pub mod mixer;
pub mod muxer;
pub mod session;
pub mod state;

pub use codec::{file_extension, negotiate_mime_type, MIME_PREFERENCE};
pub use encoder::{Encoder, EncoderEvent, EncoderFactory, EncoderOptions};
pub use engine::{EngineEvent, RecordingEngine};
pub use mixer::{AudioMixer, MixerConfig};
pub use muxer::{read_records, ContainerError, FrameMuxer, FrameMuxerFactory, MuxRecord};
pub use session::{Artifact, ChunkInfo, RecordingSession, SessionStats};
pub use state::{transition, RecordingAction, RecordingState};
