//! Encoder seam
//!
//! The engine drives an [`Encoder`] the way a browser drives its media
//! recorder: start against a stream, pause/resume, and stop with a final
//! flush. Encoded data arrives asynchronously as [`EncoderEvent`]s.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::compositor::ComposedStream;
use crate::error::RecorderResult;

/// Parameters the engine hands to a new encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Negotiated container/codec
    pub mime_type: String,
    pub video_bits_per_second: u32,
    /// Interval between chunk emissions
    pub timeslice: Duration,
    /// Rate at which the video track is sampled
    pub frame_rate: u32,
}

/// Asynchronous completions from a running encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// A unit of encoded media; may be empty
    Chunk(Vec<u8>),
    /// Runtime failure; no further chunks will follow
    Error(String),
}

#[async_trait]
pub trait Encoder: Send {
    /// Begin encoding `stream`. Events arrive on the returned channel until
    /// the encoder stops or fails.
    async fn start(&mut self, stream: &ComposedStream) -> RecorderResult<mpsc::Receiver<EncoderEvent>>;

    /// Suspend encoding, keeping buffered state
    async fn pause(&mut self) -> RecorderResult<()>;

    async fn resume(&mut self) -> RecorderResult<()>;

    /// Flush any buffered data as a final chunk, then close the event channel
    async fn stop(&mut self) -> RecorderResult<()>;

    fn name(&self) -> &str;
}

/// Creates encoders and reports which container/codec strings they accept
pub trait EncoderFactory: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn create(&self, options: EncoderOptions) -> RecorderResult<Box<dyn Encoder>>;
}
