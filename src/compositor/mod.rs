//! Stream composition
//!
//! Merges the mandatory screen video, an optional webcam overlay, and
//! optional system/microphone audio into one [`ComposedStream`]:
//! - no live webcam: the screen's video track passes straight through
//! - live webcam: a render task composites both onto a screen-sized canvas
//!   and publishes it as a new video track
//! - audio tracks are appended as independent tracks per the config

pub mod layout;
pub mod render;
pub mod stream;
pub mod task;

pub use layout::{CompositionConfig, OverlayLayout, OverlayPosition, OverlayRect, OverlaySize};
pub use stream::ComposedStream;
pub use task::RenderHandle;

use image::RgbaImage;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::RecorderSettings;
use crate::error::{RecorderError, RecorderResult};
use crate::media::{DeviceProvider, MediaSource, MediaTrack, MicrophoneConstraints, VideoSettings};
use task::RenderJob;

/// Canvas size used when the screen reports neither a frame nor a resolution
const FALLBACK_CANVAS_SIZE: (u32, u32) = (1280, 720);

/// Timing parameters for composition
#[derive(Debug, Clone)]
pub struct CompositorOptions {
    /// Frame rate of the synthesized overlay track
    pub canvas_frame_rate: u32,
    /// Per-source wait for the first decoded frame
    pub readiness_timeout: Duration,
    /// Extra wait before the first overlay frame
    pub settle_delay: Duration,
}

impl Default for CompositorOptions {
    fn default() -> Self {
        Self::from(&RecorderSettings::default())
    }
}

impl From<&RecorderSettings> for CompositorOptions {
    fn from(settings: &RecorderSettings) -> Self {
        Self {
            canvas_frame_rate: settings.canvas_frame_rate,
            readiness_timeout: settings.readiness_timeout(),
            settle_delay: settings.settle_delay(),
        }
    }
}

/// Result of a composition: the stream plus everything that must be torn
/// down with it
#[derive(Debug)]
pub struct Composition {
    stream: ComposedStream,
    render: Option<RenderHandle>,
    microphone: Option<MediaSource>,
    released: bool,
}

impl Composition {
    pub fn stream(&self) -> &ComposedStream {
        &self.stream
    }

    /// Whether the webcam is being composited (as opposed to screen passthrough)
    pub fn is_overlay_active(&self) -> bool {
        self.render.is_some()
    }

    /// Cancel the render loop, if any, and wait for it to exit
    pub async fn cancel_render(&mut self) {
        if let Some(render) = self.render.as_mut() {
            let frames = render.stop().await;
            debug!("Render loop cancelled after {} frames", frames);
        }
    }

    /// Stop every composed track and release the microphone opened for
    /// this composition. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.stream.stop_all();
        if let Some(mic) = self.microphone.as_mut() {
            mic.release();
        }
        self.released = true;
    }

    /// Cancel rendering, then release all tracks
    pub async fn teardown(&mut self) {
        self.cancel_render().await;
        self.release();
    }
}

impl Drop for Composition {
    fn drop(&mut self) {
        if !self.released {
            warn!("Composition {} dropped without teardown", self.stream.id());
            self.release();
        }
    }
}

/// Builds composed streams from independent sources
#[derive(Debug, Clone, Default)]
pub struct StreamCompositor {
    options: CompositorOptions,
}

impl StreamCompositor {
    pub fn new(options: CompositorOptions) -> Self {
        Self { options }
    }

    /// Compose `screen`, the optional `webcam` and the configured audio sources.
    ///
    /// Fails only when the screen has no live video track; missing or failing
    /// optional sources degrade to a stream without them.
    pub async fn compose(
        &self,
        provider: &dyn DeviceProvider,
        screen: &MediaSource,
        webcam: Option<&MediaSource>,
        config: &CompositionConfig,
        layout: watch::Receiver<OverlayLayout>,
    ) -> RecorderResult<Composition> {
        let screen_video = screen
            .first_video_track()
            .filter(|t| t.is_live())
            .cloned()
            .ok_or(RecorderError::NoVideoSource)?;

        let overlay = if config.webcam_enabled {
            webcam
                .and_then(|w| w.first_video_track())
                .filter(|t| t.is_live())
                .cloned()
        } else {
            None
        };

        let (video, render) = match overlay {
            Some(webcam_video) => {
                let (track, handle) = self.start_overlay(screen_video, webcam_video, layout).await;
                (track, Some(handle))
            }
            None => {
                debug!("No live webcam, passing screen video through");
                (screen_video, None)
            }
        };

        let mut audio: Vec<MediaTrack> = Vec::new();
        if config.system_audio_enabled {
            let before = audio.len();
            audio.extend(screen.audio_tracks().cloned());
            if audio.len() == before {
                warn!("System audio enabled but the screen capture carries no audio");
            }
        }

        let microphone = if config.microphone_enabled {
            self.open_microphone(provider, config).await
        } else {
            None
        };
        if let Some(mic) = &microphone {
            audio.extend(mic.audio_tracks().cloned());
        }

        let stream = ComposedStream::new(video, audio);
        info!(
            "Composed stream {}: overlay={}, audio tracks={}",
            stream.id(),
            render.is_some(),
            stream.audio_track_count()
        );

        Ok(Composition {
            stream,
            render,
            microphone,
            released: false,
        })
    }

    async fn start_overlay(
        &self,
        screen: MediaTrack,
        webcam: MediaTrack,
        layout: watch::Receiver<OverlayLayout>,
    ) -> (MediaTrack, RenderHandle) {
        let (screen_ready, webcam_ready) = futures::join!(
            self.wait_ready(&screen, "screen"),
            self.wait_ready(&webcam, "webcam")
        );
        debug!(
            "Sources ready: screen={}, webcam={}",
            screen_ready, webcam_ready
        );
        tokio::time::sleep(self.options.settle_delay).await;

        let (width, height) = canvas_size(&screen);
        let settings = VideoSettings {
            width,
            height,
            frame_rate: self.options.canvas_frame_rate,
        };
        let (track, output) = MediaTrack::video("Composited Display", settings);

        let handle = RenderHandle::spawn(RenderJob {
            canvas: RgbaImage::new(width, height),
            screen,
            webcam,
            layout,
            output,
            frame_rate: self.options.canvas_frame_rate,
        });

        (track, handle)
    }

    /// Wait for a track's first frame, giving up after the readiness timeout
    async fn wait_ready(&self, track: &MediaTrack, name: &str) -> bool {
        match timeout(self.options.readiness_timeout, track.wait_for_frame()).await {
            Ok(true) => true,
            Ok(false) => {
                warn!("{} track closed before producing a frame", name);
                false
            }
            Err(_) => {
                warn!(
                    "{} not ready after {:?}, proceeding anyway",
                    name, self.options.readiness_timeout
                );
                false
            }
        }
    }

    async fn open_microphone(
        &self,
        provider: &dyn DeviceProvider,
        config: &CompositionConfig,
    ) -> Option<MediaSource> {
        let Some(device_id) = config.microphone_device_id.as_deref() else {
            debug!("Microphone enabled without a selected device, recording without it");
            return None;
        };

        match provider
            .acquire_microphone(MicrophoneConstraints::new(device_id))
            .await
        {
            Ok(source) => Some(source),
            Err(e) => {
                warn!("Microphone unavailable ({}), recording without it", e);
                None
            }
        }
    }
}

fn canvas_size(screen: &MediaTrack) -> (u32, u32) {
    if let Some(frame) = screen.latest_frame() {
        return (frame.width(), frame.height());
    }
    match screen.video_settings() {
        Some(s) if s.width > 0 && s.height > 0 => (s.width, s.height),
        _ => FALLBACK_CANVAS_SIZE,
    }
}
