//! Synthetic device provider
//!
//! Produces solid-colour video and sine-tone audio with the same permission
//! and hot-unplug behaviour a platform provider has. Used for headless runs
//! and tests.

use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::frame::{AudioFrame, AudioStreamSource, VideoFrame};
use super::provider::{
    AudioInputDevice, DeviceProvider, MicrophoneConstraints, ScreenConstraints, WebcamConstraints,
};
use super::source::{MediaSource, SourceKind};
use super::track::{AudioTrackWriter, MediaTrack, VideoSettings, VideoTrackWriter};
use crate::error::{RecorderError, RecorderResult};

/// Configuration for synthetic devices
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Native resolution of the synthetic display
    pub screen_size: (u32, u32),
    pub screen_color: Rgba<u8>,
    /// Whether the screen picker offers system audio
    pub screen_has_audio: bool,
    pub webcam_color: Rgba<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Duration of each generated audio frame
    pub audio_frame_ms: u64,
    /// Installed microphones (with the labels revealed after permission)
    pub microphones: Vec<AudioInputDevice>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            screen_size: (1280, 720),
            screen_color: Rgba([32, 64, 96, 255]),
            screen_has_audio: true,
            webcam_color: Rgba([224, 128, 48, 255]),
            sample_rate: 48000,
            channels: 2,
            audio_frame_ms: 100,
            microphones: vec![
                AudioInputDevice {
                    id: "default".to_string(),
                    label: "Built-in Microphone".to_string(),
                },
                AudioInputDevice {
                    id: "usb-0d8c-0014".to_string(),
                    label: "USB Audio Device".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Default)]
struct SyntheticState {
    denied: HashSet<SourceKind>,
    unplugged: HashSet<String>,
    microphone_granted: bool,
    acquired: HashMap<SourceKind, usize>,
    /// Every track handed out, for leak checks
    issued: Vec<(SourceKind, MediaTrack)>,
    /// Producer halves of the screen tracks, for simulating "stop sharing"
    screen_writers: Vec<Arc<VideoTrackWriter>>,
}

/// Device provider backed by generated test patterns
pub struct SyntheticDevices {
    config: SyntheticConfig,
    state: Mutex<SyntheticState>,
}

impl SyntheticDevices {
    pub fn new(config: SyntheticConfig) -> Self {
        info!(
            "Synthetic devices initialized: {}x{} screen, {} microphones",
            config.screen_size.0,
            config.screen_size.1,
            config.microphones.len()
        );
        Self {
            config,
            state: Mutex::new(SyntheticState::default()),
        }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Make future acquisitions of `kind` fail as if the user refused
    pub fn deny(&self, kind: SourceKind) {
        self.state.lock().denied.insert(kind);
    }

    pub fn allow(&self, kind: SourceKind) {
        self.state.lock().denied.remove(&kind);
    }

    /// Remove a microphone, as if it was unplugged
    pub fn unplug(&self, device_id: &str) {
        self.state.lock().unplugged.insert(device_id.to_string());
    }

    /// Simulate the user pressing the platform's "stop sharing" control
    pub fn end_screen_share(&self) {
        let writers = std::mem::take(&mut self.state.lock().screen_writers);
        info!("Ending {} synthetic screen share(s)", writers.len());
        for writer in writers {
            writer.end();
        }
    }

    /// Number of acquisitions of `kind` so far
    pub fn acquisitions(&self, kind: SourceKind) -> usize {
        self.state.lock().acquired.get(&kind).copied().unwrap_or(0)
    }

    /// Tracks handed out that nobody has stopped yet
    pub fn live_tracks(&self) -> Vec<(SourceKind, MediaTrack)> {
        self.state
            .lock()
            .issued
            .iter()
            .filter(|(_, track)| track.is_live())
            .cloned()
            .collect()
    }

    fn check_permission(&self, kind: SourceKind) -> RecorderResult<()> {
        if self.state.lock().denied.contains(&kind) {
            debug!("Synthetic {} permission denied", kind);
            return Err(RecorderError::PermissionDenied(kind));
        }
        Ok(())
    }

    fn record_issued(&self, kind: SourceKind, tracks: &[MediaTrack]) {
        let mut state = self.state.lock();
        *state.acquired.entry(kind).or_insert(0) += 1;
        for track in tracks {
            state.issued.push((kind, track.clone()));
        }
    }

    fn open_video(
        &self,
        label: &str,
        size: (u32, u32),
        color: Rgba<u8>,
        frame_rate: u32,
    ) -> (MediaTrack, Arc<VideoTrackWriter>) {
        let settings = VideoSettings {
            width: size.0,
            height: size.1,
            frame_rate,
        };
        let (track, writer) = MediaTrack::video(label, settings);
        let writer = Arc::new(writer);
        let image = Arc::new(RgbaImage::from_pixel(size.0, size.1, color));
        spawn_video_generator(Arc::clone(&writer), image, frame_rate);
        (track, writer)
    }

    fn open_audio(&self, label: &str, source: AudioStreamSource, tone_hz: f32) -> MediaTrack {
        let (track, writer) = MediaTrack::audio(label);
        spawn_audio_generator(
            writer,
            source,
            self.config.sample_rate,
            self.config.channels,
            self.config.audio_frame_ms,
            tone_hz,
        );
        track
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

#[async_trait::async_trait]
impl DeviceProvider for SyntheticDevices {
    async fn acquire_screen(&self, constraints: ScreenConstraints) -> RecorderResult<MediaSource> {
        self.check_permission(SourceKind::Screen)?;

        let (video, writer) = self.open_video(
            "Synthetic Display",
            self.config.screen_size,
            self.config.screen_color,
            constraints.frame_rate,
        );
        let mut tracks = vec![video];

        if constraints.audio && self.config.screen_has_audio {
            tracks.push(self.open_audio("System Audio", AudioStreamSource::System, 220.0));
        }

        self.state.lock().screen_writers.push(writer);
        self.record_issued(SourceKind::Screen, &tracks);
        info!(
            "Synthetic screen acquired ({:?}, {} fps, {} tracks)",
            constraints.display_surface,
            constraints.frame_rate,
            tracks.len()
        );

        Ok(MediaSource::new(SourceKind::Screen, tracks))
    }

    async fn acquire_microphone(
        &self,
        constraints: MicrophoneConstraints,
    ) -> RecorderResult<MediaSource> {
        self.check_permission(SourceKind::Microphone)?;

        let available = {
            let state = self.state.lock();
            !state.unplugged.contains(&constraints.device_id)
                && self
                    .config
                    .microphones
                    .iter()
                    .any(|d| d.id == constraints.device_id)
        };
        if !available {
            return Err(RecorderError::DeviceUnavailable(constraints.device_id));
        }

        let track = self.open_audio("Microphone", AudioStreamSource::Microphone, 440.0);
        self.state.lock().microphone_granted = true;
        self.record_issued(SourceKind::Microphone, std::slice::from_ref(&track));
        debug!(
            "Synthetic microphone {} opened (echo cancellation: {}, noise suppression: {})",
            constraints.device_id, constraints.echo_cancellation, constraints.noise_suppression
        );

        Ok(MediaSource::new(SourceKind::Microphone, vec![track]))
    }

    async fn acquire_webcam(&self, constraints: WebcamConstraints) -> RecorderResult<MediaSource> {
        self.check_permission(SourceKind::Webcam)?;

        let (track, _writer) = self.open_video(
            "Synthetic Camera",
            (constraints.ideal_width, constraints.ideal_height),
            self.config.webcam_color,
            30,
        );
        self.record_issued(SourceKind::Webcam, std::slice::from_ref(&track));

        Ok(MediaSource::new(SourceKind::Webcam, vec![track]))
    }

    async fn enumerate_audio_inputs(&self) -> RecorderResult<Vec<AudioInputDevice>> {
        let state = self.state.lock();
        let devices = self
            .config
            .microphones
            .iter()
            .filter(|d| !state.unplugged.contains(&d.id))
            .map(|d| AudioInputDevice {
                id: d.id.clone(),
                label: if state.microphone_granted {
                    d.label.clone()
                } else {
                    String::new()
                },
            })
            .collect();
        Ok(devices)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

fn spawn_video_generator(writer: Arc<VideoTrackWriter>, image: Arc<RgbaImage>, frame_rate: u32) {
    tokio::spawn(async move {
        let period = Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let started = Instant::now();

        loop {
            ticker.tick().await;
            let timestamp_ms = started.elapsed().as_millis() as u64;
            if !writer.push(VideoFrame::shared(Arc::clone(&image), timestamp_ms)) {
                break;
            }
        }
    });
}

fn spawn_audio_generator(
    writer: AudioTrackWriter,
    source: AudioStreamSource,
    sample_rate: u32,
    channels: u16,
    frame_ms: u64,
    tone_hz: f32,
) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(frame_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let samples_per_channel = (sample_rate as u64 * frame_ms / 1000) as usize;
        let mut phase = 0usize;
        let mut timestamp_ms = 0u64;

        loop {
            ticker.tick().await;
            let mut samples = Vec::with_capacity(samples_per_channel * channels as usize);
            for i in 0..samples_per_channel {
                let t = (phase + i) as f32 / sample_rate as f32;
                let value = ((2.0 * PI * tone_hz * t).sin() * 3000.0) as i16;
                for _ in 0..channels {
                    samples.push(value);
                }
            }
            phase += samples_per_channel;

            let frame = AudioFrame {
                samples,
                sample_rate,
                channels,
                timestamp_ms,
                source,
            };
            if !writer.push(frame) {
                break;
            }
            timestamp_ms += frame_ms;
        }
    });
}
