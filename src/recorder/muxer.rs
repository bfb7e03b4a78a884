//! In-tree encoder
//!
//! [`FrameMuxer`] samples the composed stream's video track at a fixed rate,
//! compresses each new frame as JPEG, mixes the audio tracks into one PCM
//! lane, and emits everything gathered during a timeslice as one chunk of
//! length-prefixed records. The first chunk opens with a stream header, so
//! the concatenation of all chunks in order is a readable container.
//!
//! Record layout: tag `u8`, timestamp `u64` LE (ms of media time, pauses
//! excluded), payload length `u32` LE, payload. Video payloads are JPEG
//! bytes; audio payloads are sample rate `u32` LE, channels `u16` LE, then
//! interleaved `i16` LE samples.

use async_trait::async_trait;
use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{RgbImage, RgbaImage};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::codec::MIME_PREFERENCE;
use super::encoder::{Encoder, EncoderEvent, EncoderFactory, EncoderOptions};
use super::mixer::{AudioMixer, MixerConfig};
use crate::compositor::ComposedStream;
use crate::error::{RecorderError, RecorderResult};
use crate::media::{AudioFrame, MediaTrack};

/// Stream header: magic plus format version
pub const STREAM_HEADER: &[u8; 5] = b"GRMX\x01";

pub const RECORD_VIDEO: u8 = b'V';
pub const RECORD_AUDIO: u8 = b'A';

const RECORD_HEADER_LEN: usize = 1 + 8 + 4;
const EVENT_CAPACITY: usize = 64;
const AUDIO_CAPACITY: usize = 256;

/// Creates [`FrameMuxer`]s for a configurable set of MIME types
#[derive(Debug, Clone)]
pub struct FrameMuxerFactory {
    supported: Vec<String>,
}

impl Default for FrameMuxerFactory {
    fn default() -> Self {
        Self::with_supported_types(MIME_PREFERENCE)
    }
}

impl FrameMuxerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the MIME types this factory claims to support
    pub fn with_supported_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported: types.into_iter().map(Into::into).collect(),
        }
    }
}

impl EncoderFactory for FrameMuxerFactory {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|t| t == mime_type)
    }

    fn create(&self, options: EncoderOptions) -> RecorderResult<Box<dyn Encoder>> {
        if !self.is_type_supported(&options.mime_type) {
            return Err(RecorderError::EncoderInitFailed(format!(
                "unsupported type {}",
                options.mime_type
            )));
        }
        if options.frame_rate == 0 || options.timeslice.is_zero() {
            return Err(RecorderError::EncoderInitFailed(
                "frame rate and timeslice must be positive".to_string(),
            ));
        }
        Ok(Box::new(FrameMuxer::new(options)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MuxerControl {
    Recording,
    Paused,
    Stopping,
}

/// Chunked frame-record encoder
pub struct FrameMuxer {
    options: EncoderOptions,
    control: Option<watch::Sender<MuxerControl>>,
    task: Option<JoinHandle<()>>,
    forwarders: Vec<JoinHandle<()>>,
}

impl FrameMuxer {
    pub fn new(options: EncoderOptions) -> Self {
        Self {
            options,
            control: None,
            task: None,
            forwarders: Vec::new(),
        }
    }

    fn send_control(&self, state: MuxerControl) -> RecorderResult<()> {
        match &self.control {
            Some(control) => {
                control.send_replace(state);
                Ok(())
            }
            None => Err(RecorderError::EncoderRuntimeError(
                "muxer not started".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Encoder for FrameMuxer {
    async fn start(&mut self, stream: &ComposedStream) -> RecorderResult<mpsc::Receiver<EncoderEvent>> {
        if self.control.is_some() {
            return Err(RecorderError::EncoderInitFailed(
                "muxer already started".to_string(),
            ));
        }

        let video = stream.video_track().clone();
        if !video.is_live() {
            return Err(RecorderError::EncoderInitFailed(
                "video track is not live".to_string(),
            ));
        }

        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_CAPACITY);
        for (index, track) in stream.audio_tracks().iter().enumerate() {
            if let Some(frames) = track.subscribe_audio() {
                self.forwarders.push(tokio::spawn(forward_audio(
                    index,
                    track.clone(),
                    frames,
                    audio_tx.clone(),
                )));
            }
        }
        drop(audio_tx);

        let (control_tx, control_rx) = watch::channel(MuxerControl::Recording);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);

        info!(
            "Frame muxer started: {} at {} fps, {} audio tracks, {:?} timeslice",
            self.options.mime_type,
            self.options.frame_rate,
            stream.audio_track_count(),
            self.options.timeslice
        );

        self.task = Some(tokio::spawn(run_muxer(
            self.options.clone(),
            video,
            audio_rx,
            control_rx,
            events_tx,
        )));
        self.control = Some(control_tx);

        Ok(events_rx)
    }

    async fn pause(&mut self) -> RecorderResult<()> {
        self.send_control(MuxerControl::Paused)
    }

    async fn resume(&mut self) -> RecorderResult<()> {
        self.send_control(MuxerControl::Recording)
    }

    async fn stop(&mut self) -> RecorderResult<()> {
        if self.control.is_none() {
            return Ok(());
        }
        self.send_control(MuxerControl::Stopping)?;

        let result = match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| RecorderError::EncoderRuntimeError(format!("muxer task failed: {}", e))),
            None => Ok(()),
        };

        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
        result
    }

    fn name(&self) -> &str {
        "frame-muxer"
    }
}

impl Drop for FrameMuxer {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
        for forwarder in &self.forwarders {
            forwarder.abort();
        }
    }
}

/// Copy one audio track's frames into the shared muxer queue until the
/// track ends
async fn forward_audio(
    index: usize,
    track: MediaTrack,
    mut frames: broadcast::Receiver<AudioFrame>,
    tx: mpsc::Sender<(usize, AudioFrame)>,
) {
    loop {
        tokio::select! {
            _ = track.ended() => break,
            received = frames.recv() => match received {
                Ok(frame) => {
                    if tx.send((index, frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Audio track {} lagged, skipped {} frames", track.label(), skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("Audio forwarder for {} finished", track.label());
}

/// Per-run muxing state
struct MuxState {
    chunk: Vec<u8>,
    header_written: bool,
    mixer: Option<AudioMixer>,
    started: Instant,
    paused_at: Option<Instant>,
    paused_for: Duration,
    last_video_ts: Option<u64>,
    quality: Option<u8>,
    bits_per_second: u32,
    frame_rate: u32,
}

impl MuxState {
    fn media_time_ms(&self) -> u64 {
        let paused = self.paused_for + self.paused_at.map(|p| p.elapsed()).unwrap_or_default();
        self.started.elapsed().saturating_sub(paused).as_millis() as u64
    }

    fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    fn set_paused(&mut self, paused: bool) {
        match (paused, self.paused_at) {
            (true, None) => self.paused_at = Some(Instant::now()),
            (false, Some(at)) => {
                self.paused_for += at.elapsed();
                self.paused_at = None;
            }
            _ => {}
        }
    }

    fn write_record(&mut self, tag: u8, timestamp_ms: u64, payload: &[u8]) {
        if !self.header_written {
            self.chunk.extend_from_slice(STREAM_HEADER);
            self.header_written = true;
        }
        self.chunk.push(tag);
        self.chunk.extend_from_slice(&timestamp_ms.to_le_bytes());
        self.chunk.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.chunk.extend_from_slice(payload);
    }

    fn sample_video(&mut self, video: &MediaTrack) -> Result<(), image::ImageError> {
        let Some(frame) = video.latest_frame() else {
            return Ok(());
        };
        if self.last_video_ts == Some(frame.timestamp_ms) {
            return Ok(());
        }
        self.last_video_ts = Some(frame.timestamp_ms);

        let (bits_per_second, frame_rate) = (self.bits_per_second, self.frame_rate);
        let quality = *self.quality.get_or_insert_with(|| {
            jpeg_quality(bits_per_second, frame.width(), frame.height(), frame_rate)
        });
        let jpeg = encode_jpeg(frame.image(), quality)?;
        let ts = self.media_time_ms();
        self.write_record(RECORD_VIDEO, ts, &jpeg);
        Ok(())
    }

    fn buffer_audio(&mut self, track: usize, frame: AudioFrame) {
        self.mixer
            .get_or_insert_with(|| AudioMixer::new(MixerConfig::from_frame(&frame)))
            .push(track, frame);
    }

    fn flush_audio(&mut self) {
        let Some(mixer) = self.mixer.as_mut() else {
            return;
        };
        let mixed = mixer.drain();
        let ts = self.media_time_ms();
        for frame in mixed {
            let mut payload = Vec::with_capacity(6 + frame.samples.len() * 2);
            payload.extend_from_slice(&frame.sample_rate.to_le_bytes());
            payload.extend_from_slice(&frame.channels.to_le_bytes());
            for sample in &frame.samples {
                payload.extend_from_slice(&sample.to_le_bytes());
            }
            self.write_record(RECORD_AUDIO, ts, &payload);
        }
    }

    fn take_chunk(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.chunk)
    }
}

async fn run_muxer(
    options: EncoderOptions,
    video: MediaTrack,
    mut audio: mpsc::Receiver<(usize, AudioFrame)>,
    mut control: watch::Receiver<MuxerControl>,
    events: mpsc::Sender<EncoderEvent>,
) {
    let mut sampler = interval(Duration::from_secs_f64(1.0 / options.frame_rate.max(1) as f64));
    sampler.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut slicer = interval_at(Instant::now() + options.timeslice, options.timeslice);
    slicer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut state = MuxState {
        chunk: Vec::new(),
        header_written: false,
        mixer: None,
        started: Instant::now(),
        paused_at: None,
        paused_for: Duration::ZERO,
        last_video_ts: None,
        quality: None,
        bits_per_second: options.video_bits_per_second,
        frame_rate: options.frame_rate,
    };
    let mut chunks = 0u64;

    loop {
        tokio::select! {
            biased;
            changed = control.changed() => {
                let next = match changed {
                    Ok(()) => *control.borrow_and_update(),
                    Err(_) => MuxerControl::Stopping,
                };
                match next {
                    MuxerControl::Stopping => break,
                    MuxerControl::Paused => state.set_paused(true),
                    MuxerControl::Recording => state.set_paused(false),
                }
            }
            _ = sampler.tick() => {
                if state.is_paused() {
                    continue;
                }
                if let Err(e) = state.sample_video(&video) {
                    error!("Video frame encoding failed: {}", e);
                    let _ = events.send(EncoderEvent::Error(e.to_string())).await;
                    return;
                }
            }
            Some((track, frame)) = audio.recv() => {
                if !state.is_paused() {
                    state.buffer_audio(track, frame);
                }
            }
            _ = slicer.tick() => {
                if state.is_paused() {
                    continue;
                }
                state.flush_audio();
                let chunk = state.take_chunk();
                debug!("Muxer emitting chunk {} ({} bytes)", chunks, chunk.len());
                chunks += 1;
                if events.send(EncoderEvent::Chunk(chunk)).await.is_err() {
                    debug!("Encoder event receiver dropped, stopping muxer");
                    return;
                }
            }
        }
    }

    // Final flush: whatever audio is queued, then the last partial chunk
    while let Ok((track, frame)) = audio.try_recv() {
        if !state.is_paused() {
            state.buffer_audio(track, frame);
        }
    }
    state.flush_audio();
    let chunk = state.take_chunk();
    info!(
        "Frame muxer stopped after {} chunks (final chunk {} bytes)",
        chunks + 1,
        chunk.len()
    );
    let _ = events.send(EncoderEvent::Chunk(chunk)).await;
}

/// JPEG quality for a target bitrate, from the bits available per pixel
fn jpeg_quality(bits_per_second: u32, width: u32, height: u32, frame_rate: u32) -> u8 {
    let pixels_per_second = width as f64 * height as f64 * frame_rate.max(1) as f64;
    if pixels_per_second == 0.0 {
        return 90;
    }
    let bpp = bits_per_second as f64 / pixels_per_second;
    (30.0 + bpp * 400.0).clamp(30.0, 90.0) as u8
}

fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb: RgbImage = image.convert();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb)?;
    Ok(out)
}

/// Errors reading a muxed stream back
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContainerError {
    #[error("missing stream header")]
    BadHeader,

    #[error("record truncated at byte {0}")]
    Truncated(usize),

    #[error("unknown record tag {tag:#04x} at byte {offset}")]
    UnknownTag { tag: u8, offset: usize },
}

/// One record of a muxed stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxRecord {
    pub tag: u8,
    pub timestamp_ms: u64,
    pub payload: Vec<u8>,
}

impl MuxRecord {
    pub fn is_video(&self) -> bool {
        self.tag == RECORD_VIDEO
    }

    pub fn is_audio(&self) -> bool {
        self.tag == RECORD_AUDIO
    }
}

/// Parse a complete muxed stream (all chunks concatenated in order)
pub fn read_records(data: &[u8]) -> Result<Vec<MuxRecord>, ContainerError> {
    let body = data
        .strip_prefix(STREAM_HEADER.as_slice())
        .ok_or(ContainerError::BadHeader)?;

    let mut records = Vec::new();
    let mut offset = 0;
    while offset < body.len() {
        let absolute = offset + STREAM_HEADER.len();
        let header = body
            .get(offset..offset + RECORD_HEADER_LEN)
            .ok_or(ContainerError::Truncated(absolute))?;

        let tag = header[0];
        if tag != RECORD_VIDEO && tag != RECORD_AUDIO {
            return Err(ContainerError::UnknownTag {
                tag,
                offset: absolute,
            });
        }
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&header[1..9]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&header[9..13]);
        let len = u32::from_le_bytes(len) as usize;

        let start = offset + RECORD_HEADER_LEN;
        let payload = body
            .get(start..start + len)
            .ok_or(ContainerError::Truncated(absolute))?;

        records.push(MuxRecord {
            tag,
            timestamp_ms: u64::from_le_bytes(ts),
            payload: payload.to_vec(),
        });
        offset = start + len;
    }
    Ok(records)
}
