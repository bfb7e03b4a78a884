//! Recorder orchestration
//!
//! [`Recorder`] owns every acquired source for the duration of a recording
//! and sequences them through start, pause, resume, stop and reset. All
//! sources are released on every exit path: user stop, reset, encoder
//! failure, the screen share ending underneath us, and shutdown.

pub mod events;

pub use events::{ArtifactInfo, RecorderEvent, RecorderStatus};

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::compositor::{
    ComposedStream, Composition, CompositionConfig, CompositorOptions, OverlayLayout,
    OverlayPosition, OverlaySize, StreamCompositor,
};
use crate::config::RecorderSettings;
use crate::error::{Notice, RecorderError, RecorderResult};
use crate::media::{
    AudioInputDevice, DeviceProvider, MediaSource, MediaTrack, MicrophoneConstraints,
    ScreenConstraints, WebcamConstraints,
};
use crate::recorder::{
    Artifact, EncoderFactory, EngineEvent, RecordingEngine, RecordingState,
};
use crate::timer::SessionTimer;
use crate::upload::{UploadError, UploadReceipt, Uploader};

const EVENT_CAPACITY: usize = 64;

/// Local download name: `recording-YYYY-MM-DDTHH-MM-SS.webm`
pub fn download_filename(at: DateTime<Utc>) -> String {
    format!("recording-{}.webm", at.format("%Y-%m-%dT%H-%M-%S"))
}

#[derive(Default)]
struct RecorderInner {
    config: CompositionConfig,
    devices: Vec<AudioInputDevice>,
    /// Open while the webcam is enabled, for live preview and overlay
    webcam: Option<MediaSource>,
    screen: Option<MediaSource>,
    composition: Option<Composition>,
    /// Exists from a successful start until reset or failure
    engine: Option<RecordingEngine>,
    timer: SessionTimer,
    watchers: Vec<JoinHandle<()>>,
}

impl RecorderInner {
    fn state(&self) -> RecordingState {
        self.engine
            .as_ref()
            .map(|e| e.state())
            .unwrap_or(RecordingState::Idle)
    }

    /// Composition topology may only change while no recording is active
    fn ensure_unlocked(&self) -> RecorderResult<()> {
        if self.state().is_active() {
            return Err(RecorderError::SettingsLocked);
        }
        Ok(())
    }

    fn abort_watchers(&mut self) {
        for watcher in self.watchers.drain(..) {
            watcher.abort();
        }
    }
}

struct Shared {
    inner: Mutex<RecorderInner>,
    events: broadcast::Sender<RecorderEvent>,
    layout: watch::Sender<OverlayLayout>,
    provider: Arc<dyn DeviceProvider>,
    encoders: Arc<dyn EncoderFactory>,
    compositor: StreamCompositor,
    settings: RecorderSettings,
}

/// Handle to the recording orchestrator. Clones share the same recorder.
#[derive(Clone)]
pub struct Recorder {
    shared: Arc<Shared>,
}

impl Recorder {
    pub fn new(
        provider: Arc<dyn DeviceProvider>,
        encoders: Arc<dyn EncoderFactory>,
        settings: RecorderSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (layout, _) = watch::channel(OverlayLayout::default());
        info!("Recorder created with {} device provider", provider.name());

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(RecorderInner::default()),
                events,
                layout,
                provider,
                encoders,
                compositor: StreamCompositor::new(CompositorOptions::from(&settings)),
                settings,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.shared.events.subscribe()
    }

    pub async fn state(&self) -> RecordingState {
        self.shared.inner.lock().await.state()
    }

    pub async fn status(&self) -> RecorderStatus {
        let inner = self.shared.inner.lock().await;
        RecorderStatus {
            state: inner.state(),
            seconds: inner.timer.elapsed_secs(),
            formatted_time: inner.timer.formatted_time(),
            settings: inner.config.clone(),
            audio_devices: inner.devices.clone(),
            webcam_live: inner.webcam.as_ref().is_some_and(|w| w.is_live()),
            artifact: inner
                .engine
                .as_ref()
                .and_then(|e| e.artifact())
                .map(|a| ArtifactInfo::from(&a)),
        }
    }

    pub async fn elapsed_secs(&self) -> u64 {
        self.shared.inner.lock().await.timer.elapsed_secs()
    }

    pub async fn formatted_time(&self) -> String {
        self.shared.inner.lock().await.timer.formatted_time()
    }

    pub async fn composition_config(&self) -> CompositionConfig {
        self.shared.inner.lock().await.config.clone()
    }

    /// Whether a recording engine instance exists
    pub async fn has_engine(&self) -> bool {
        self.shared.inner.lock().await.engine.is_some()
    }

    /// The stream being recorded, while a recording is active
    pub async fn composed_stream(&self) -> Option<ComposedStream> {
        let inner = self.shared.inner.lock().await;
        inner.composition.as_ref().map(|c| c.stream().clone())
    }

    /// Raw webcam video for a live preview
    pub async fn webcam_preview(&self) -> Option<MediaTrack> {
        let inner = self.shared.inner.lock().await;
        inner
            .webcam
            .as_ref()
            .and_then(|w| w.first_video_track())
            .cloned()
    }

    /// Acquire the screen, compose, and start the engine and timer.
    ///
    /// Accepted only from idle; a stopped recording must be reset first.
    pub async fn start(&self) -> RecorderResult<()> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;

        let state = inner.state();
        if state != RecordingState::Idle {
            return Err(RecorderError::InvalidState {
                action: "start",
                state,
            });
        }

        if inner.engine.is_some() {
            // Left behind by an engine failure whose cleanup has not run yet
            self.teardown_sources(&mut inner).await;
            inner.engine = None;
        }

        let constraints = ScreenConstraints {
            frame_rate: shared.settings.screen_frame_rate,
            audio: inner.config.system_audio_enabled,
            ..ScreenConstraints::default()
        };
        let mut screen = match shared.provider.acquire_screen(constraints).await {
            Ok(screen) => screen,
            Err(e) => {
                warn!("Screen capture failed: {}", e);
                self.notify(e.notice());
                return Err(e);
            }
        };

        let composition = shared
            .compositor
            .compose(
                shared.provider.as_ref(),
                &screen,
                inner.webcam.as_ref(),
                &inner.config,
                shared.layout.subscribe(),
            )
            .await;
        let mut composition = match composition {
            Ok(composition) => composition,
            Err(e) => {
                error!("Composition failed: {}", e);
                shared.provider.release(&mut screen);
                self.notify(e.notice());
                return Err(e);
            }
        };

        let mut engine = RecordingEngine::new(Arc::clone(&shared.encoders), shared.settings.clone());
        // Subscribe before the pump exists so an immediate failure is seen
        let mut engine_events = engine.subscribe();
        if let Err(e) = engine.start(composition.stream()).await {
            error!("Recording engine failed to start: {}", e);
            composition.teardown().await;
            shared.provider.release(&mut screen);
            self.notify(e.notice());
            return Err(e);
        }

        if engine.state() == RecordingState::Idle {
            let message = take_failure(&mut engine_events)
                .unwrap_or_else(|| "encoder failed while starting".to_string());
            error!("Recording aborted right after start: {}", message);
            composition.teardown().await;
            shared.provider.release(&mut screen);
            let e = RecorderError::EncoderRuntimeError(message);
            self.emit(RecorderEvent::Failed(e.notice()));
            return Err(e);
        }

        inner.timer.start();

        let weak = Arc::downgrade(shared);
        if let Some(track) = screen.first_video_track().cloned() {
            inner.watchers.push(spawn_screen_watcher(track, weak.clone()));
        }
        inner.watchers.push(spawn_engine_watcher(engine_events, weak));

        inner.screen = Some(screen);
        inner.composition = Some(composition);
        inner.engine = Some(engine);

        info!("Recording started");
        self.emit(RecorderEvent::StateChanged {
            state: RecordingState::Recording,
        });
        Ok(())
    }

    /// Pause the engine and timer. No-op unless recording.
    pub async fn pause(&self) -> RecorderResult<()> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state() != RecordingState::Recording {
            debug!("Pause ignored while {}", inner.state());
            return Ok(());
        }
        if let Some(engine) = inner.engine.as_mut() {
            engine.pause().await?;
        }
        inner.timer.pause();
        self.emit(RecorderEvent::StateChanged {
            state: RecordingState::Paused,
        });
        Ok(())
    }

    /// Resume the engine and timer. No-op unless paused.
    pub async fn resume(&self) -> RecorderResult<()> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state() != RecordingState::Paused {
            debug!("Resume ignored while {}", inner.state());
            return Ok(());
        }
        if let Some(engine) = inner.engine.as_mut() {
            engine.resume().await?;
        }
        inner.timer.resume();
        self.emit(RecorderEvent::StateChanged {
            state: RecordingState::Recording,
        });
        Ok(())
    }

    /// Finalize the recording and release every source.
    ///
    /// Idempotent: a second call returns the same artifact. Returns `None`
    /// when nothing was recorded.
    pub async fn stop(&self) -> RecorderResult<Option<Artifact>> {
        let mut inner = self.shared.inner.lock().await;
        self.stop_locked(&mut inner).await
    }

    /// Stop if active, then discard the artifact and zero the timer
    pub async fn reset(&self) {
        let mut inner = self.shared.inner.lock().await;
        if let Err(e) = self.stop_locked(&mut inner).await {
            warn!("Stop during reset failed: {}", e);
        }
        self.release_webcam(&mut inner);

        if let Some(mut engine) = inner.engine.take() {
            engine.reset();
        }
        inner.timer.reset();
        info!("Recorder reset");
        self.emit(RecorderEvent::StateChanged {
            state: RecordingState::Idle,
        });
    }

    /// Release everything, including the webcam preview
    pub async fn shutdown(&self) {
        let mut inner = self.shared.inner.lock().await;
        if let Err(e) = self.stop_locked(&mut inner).await {
            warn!("Stop during shutdown failed: {}", e);
        }
        self.release_webcam(&mut inner);
        inner.timer.pause();
        info!("Recorder shut down");
    }

    async fn stop_locked(&self, inner: &mut RecorderInner) -> RecorderResult<Option<Artifact>> {
        let Some(engine) = inner.engine.as_mut() else {
            return Ok(None);
        };
        if !engine.state().is_active() {
            return Ok(engine.artifact());
        }

        let result = engine.stop().await;

        inner.abort_watchers();
        if let Some(mut screen) = inner.screen.take() {
            self.shared.provider.release(&mut screen);
        }
        self.release_webcam(inner);
        if let Some(composition) = inner.composition.as_mut() {
            composition.cancel_render().await;
        }
        inner.timer.pause();
        if let Some(mut composition) = inner.composition.take() {
            composition.release();
        }

        match result {
            Ok(artifact) => {
                info!("Recording stopped at {}", inner.timer.formatted_time());
                self.emit(RecorderEvent::StateChanged {
                    state: RecordingState::Stopped,
                });
                if let Some(artifact) = &artifact {
                    self.emit(RecorderEvent::ArtifactReady {
                        bytes: artifact.len(),
                        mime_type: artifact.mime_type().to_string(),
                    });
                }
                Ok(artifact)
            }
            Err(e) => {
                error!("Recording could not be finalized: {}", e);
                inner.engine = None;
                inner.timer.reset();
                self.emit(RecorderEvent::Failed(e.notice()));
                self.emit(RecorderEvent::StateChanged {
                    state: RecordingState::Idle,
                });
                Err(e)
            }
        }
    }

    /// The screen share ended outside our control: finalize like a user stop
    async fn on_screen_ended(&self) {
        let mut inner = self.shared.inner.lock().await;
        if !inner.state().is_active() {
            return;
        }
        info!("Screen share ended while recording, finalizing");
        match self.stop_locked(&mut inner).await {
            Ok(_) => self.notify(Notice::screen_ended()),
            Err(e) => warn!("Auto-stop after screen share ended failed: {}", e),
        }
    }

    /// The engine hit a runtime error and already discarded its data
    async fn on_engine_failed(&self, message: String) {
        let mut inner = self.shared.inner.lock().await;
        if inner.engine.as_ref().map(|e| e.state()) != Some(RecordingState::Idle) {
            return;
        }
        error!("Recording aborted: {}", message);

        self.teardown_sources(&mut inner).await;
        inner.engine = None;
        inner.timer.reset();

        self.emit(RecorderEvent::Failed(
            RecorderError::EncoderRuntimeError(message).notice(),
        ));
        self.emit(RecorderEvent::StateChanged {
            state: RecordingState::Idle,
        });
    }

    /// Release the screen and composition of a failed recording. The webcam
    /// preview stays open for a retry.
    async fn teardown_sources(&self, inner: &mut RecorderInner) {
        inner.abort_watchers();
        if let Some(mut screen) = inner.screen.take() {
            self.shared.provider.release(&mut screen);
        }
        if let Some(mut composition) = inner.composition.take() {
            composition.teardown().await;
        }
    }

    fn release_webcam(&self, inner: &mut RecorderInner) {
        if let Some(mut webcam) = inner.webcam.take() {
            self.shared.provider.release(&mut webcam);
            debug!("Webcam released");
        }
        inner.config.webcam_enabled = false;
    }

    /// Enable or disable the microphone. Enabling probes the selected device
    /// first and stays off (with a notice) if it cannot be opened.
    pub async fn toggle_microphone(&self) -> RecorderResult<bool> {
        let mut inner = self.shared.inner.lock().await;
        inner.ensure_unlocked()?;

        if inner.config.microphone_enabled {
            inner.config.microphone_enabled = false;
            info!("Microphone disabled");
            return Ok(false);
        }

        let device_id = match inner.config.microphone_device_id.clone() {
            Some(id) => Some(id),
            None => self
                .refresh_devices_locked(&mut inner)
                .await?
                .first()
                .map(|d| d.id.clone()),
        };
        let Some(device_id) = device_id else {
            warn!("No audio input available");
            self.notify(Notice::mic_denied());
            return Ok(false);
        };

        match self
            .shared
            .provider
            .acquire_microphone(MicrophoneConstraints::new(device_id.as_str()))
            .await
        {
            Ok(mut probe) => {
                self.shared.provider.release(&mut probe);
                inner.config.microphone_device_id = Some(device_id);
                inner.config.microphone_enabled = true;
                // Labels become visible once permission is granted
                if let Err(e) = self.refresh_devices_locked(&mut inner).await {
                    warn!("Device refresh after enabling microphone failed: {}", e);
                }
                info!("Microphone enabled");
                Ok(true)
            }
            Err(e) => {
                warn!("Microphone probe failed: {}", e);
                self.notify(Notice::mic_denied());
                Ok(false)
            }
        }
    }

    pub async fn toggle_system_audio(&self) -> RecorderResult<bool> {
        let mut inner = self.shared.inner.lock().await;
        inner.ensure_unlocked()?;
        inner.config.system_audio_enabled = !inner.config.system_audio_enabled;
        info!("System audio enabled: {}", inner.config.system_audio_enabled);
        Ok(inner.config.system_audio_enabled)
    }

    /// Enable (opening the camera for preview) or disable (releasing it) the
    /// webcam overlay
    pub async fn toggle_webcam(&self) -> RecorderResult<bool> {
        let mut inner = self.shared.inner.lock().await;
        inner.ensure_unlocked()?;

        if inner.config.webcam_enabled {
            self.release_webcam(&mut inner);
            info!("Webcam disabled");
            return Ok(false);
        }

        match self
            .shared
            .provider
            .acquire_webcam(WebcamConstraints::default())
            .await
        {
            Ok(webcam) => {
                inner.webcam = Some(webcam);
                inner.config.webcam_enabled = true;
                info!("Webcam enabled");
                Ok(true)
            }
            Err(e) => {
                warn!("Webcam unavailable: {}", e);
                self.notify(Notice::webcam_denied());
                Ok(false)
            }
        }
    }

    pub async fn select_audio_device(&self, device_id: &str) -> RecorderResult<()> {
        let mut inner = self.shared.inner.lock().await;
        inner.ensure_unlocked()?;

        if !inner.devices.iter().any(|d| d.id == device_id) {
            self.refresh_devices_locked(&mut inner).await?;
        }
        if !inner.devices.iter().any(|d| d.id == device_id) {
            return Err(RecorderError::DeviceUnavailable(device_id.to_string()));
        }

        inner.config.microphone_device_id = Some(device_id.to_string());
        info!("Audio input selected: {}", device_id);
        Ok(())
    }

    /// Re-enumerate audio inputs
    pub async fn refresh_devices(&self) -> RecorderResult<Vec<AudioInputDevice>> {
        let mut inner = self.shared.inner.lock().await;
        self.refresh_devices_locked(&mut inner).await
    }

    pub async fn audio_devices(&self) -> Vec<AudioInputDevice> {
        self.shared.inner.lock().await.devices.clone()
    }

    async fn refresh_devices_locked(
        &self,
        inner: &mut RecorderInner,
    ) -> RecorderResult<Vec<AudioInputDevice>> {
        let provider = &self.shared.provider;
        let mut devices = provider.enumerate_audio_inputs().await?;

        // Empty labels mean permission was never granted: probe once
        if devices.iter().any(|d| d.label.is_empty()) {
            let probe_id = inner
                .config
                .microphone_device_id
                .clone()
                .filter(|id| devices.iter().any(|d| &d.id == id))
                .or_else(|| devices.first().map(|d| d.id.clone()));
            if let Some(probe_id) = probe_id {
                match provider
                    .acquire_microphone(MicrophoneConstraints::new(probe_id))
                    .await
                {
                    Ok(mut probe) => {
                        provider.release(&mut probe);
                        devices = provider.enumerate_audio_inputs().await?;
                    }
                    Err(e) => warn!("Microphone permission probe failed: {}", e),
                }
            }
        }

        for device in &mut devices {
            device.label = device.display_label();
        }

        let selected_present = inner
            .config
            .microphone_device_id
            .as_ref()
            .is_some_and(|id| devices.iter().any(|d| &d.id == id));
        if !selected_present && !inner.state().is_active() {
            if let Some(stale) = &inner.config.microphone_device_id {
                warn!("Selected audio input {} is gone", stale);
            }
            inner.config.microphone_device_id = devices.first().map(|d| d.id.clone());
        }

        debug!("{} audio inputs available", devices.len());
        inner.devices = devices.clone();
        Ok(devices)
    }

    /// Move the overlay. Takes effect on the next drawn frame.
    pub async fn set_position(&self, position: OverlayPosition) {
        self.shared.layout.send_modify(|layout| layout.position = position);
        self.shared.inner.lock().await.config.layout.position = position;
    }

    /// Resize the overlay. Takes effect on the next drawn frame.
    pub async fn set_size(&self, size: OverlaySize) {
        self.shared.layout.send_modify(|layout| layout.size = size);
        self.shared.inner.lock().await.config.layout.size = size;
    }

    pub fn layout(&self) -> OverlayLayout {
        *self.shared.layout.borrow()
    }

    /// The finalized recording
    pub async fn artifact(&self) -> RecorderResult<Artifact> {
        let inner = self.shared.inner.lock().await;
        inner
            .engine
            .as_ref()
            .and_then(|e| e.artifact())
            .ok_or(RecorderError::NoArtifact)
    }

    /// Write the recording into `dir` under a timestamped name
    pub async fn save_artifact(&self, dir: &Path) -> RecorderResult<PathBuf> {
        let artifact = self.artifact().await?;
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(download_filename(Utc::now()));
        tokio::fs::write(&path, artifact.bytes()).await?;
        info!("Recording saved to {} ({} bytes)", path.display(), artifact.len());
        Ok(path)
    }

    /// Hand the finalized recording and its length to `uploader`
    pub async fn upload(&self, uploader: &Uploader) -> Result<UploadReceipt, UploadError> {
        let (artifact, seconds) = {
            let inner = self.shared.inner.lock().await;
            let artifact = inner
                .engine
                .as_ref()
                .and_then(|e| e.artifact())
                .ok_or(UploadError::NoRecording)?;
            (artifact, inner.timer.elapsed_secs())
        };
        info!("Uploading {} second recording", seconds);
        uploader.upload(&artifact, Some(seconds)).await
    }

    fn notify(&self, notice: Notice) {
        self.emit(RecorderEvent::Notice(notice));
    }

    fn emit(&self, event: RecorderEvent) {
        let _ = self.shared.events.send(event);
    }
}

fn spawn_screen_watcher(track: MediaTrack, weak: Weak<Shared>) -> JoinHandle<()> {
    tokio::spawn(async move {
        track.ended().await;
        let Some(shared) = weak.upgrade() else {
            return;
        };
        // Stopping aborts this watcher, so finish on a detached task
        tokio::spawn(async move {
            Recorder { shared }.on_screen_ended().await;
        });
    })
}

/// The failure message already queued on `events`, if any
fn take_failure(events: &mut broadcast::Receiver<EngineEvent>) -> Option<String> {
    loop {
        match events.try_recv() {
            Ok(EngineEvent::Failed(message)) => return Some(message),
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return None,
        }
    }
}

fn spawn_engine_watcher(
    mut events: broadcast::Receiver<EngineEvent>,
    weak: Weak<Shared>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EngineEvent::Failed(message)) => {
                    let Some(shared) = weak.upgrade() else {
                        return;
                    };
                    tokio::spawn(async move {
                        Recorder { shared }.on_engine_failed(message).await;
                    });
                    return;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_download_filename_is_timestamped() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(download_filename(at), "recording-2024-03-09T14-05-07.webm");
    }
}
