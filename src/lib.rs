pub mod compositor;
pub mod config;
pub mod error;
pub mod http;
pub mod media;
pub mod orchestrator;
pub mod recorder;
pub mod timer;
pub mod upload;

pub use compositor::{
    ComposedStream, Composition, CompositionConfig, OverlayLayout, OverlayPosition, OverlaySize,
    StreamCompositor,
};
pub use config::{Config, RecorderSettings};
pub use error::{Notice, RecorderError, RecorderResult};
pub use http::{create_router, AppState};
pub use media::{
    AudioInputDevice, DeviceProvider, MediaSource, MediaTrack, SourceKind, SyntheticConfig,
    SyntheticDevices,
};
pub use orchestrator::{Recorder, RecorderEvent, RecorderStatus};
pub use recorder::{
    Artifact, Encoder, EncoderFactory, FrameMuxerFactory, RecordingEngine, RecordingState,
};
pub use timer::{format_elapsed, SessionTimer};
pub use upload::{share_url, ArtifactStore, MemoryStore, UploadError, UploadReceipt, Uploader};
