use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::codec::negotiate_mime_type;
use super::encoder::{Encoder, EncoderEvent, EncoderFactory, EncoderOptions};
use super::session::{Artifact, ChunkInfo, RecordingSession, SessionStats};
use super::state::{transition, RecordingAction, RecordingState};
use crate::compositor::ComposedStream;
use crate::config::RecorderSettings;
use crate::error::{RecorderError, RecorderResult};

const EVENT_CAPACITY: usize = 64;

/// Notifications from the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    StateChanged(RecordingState),
    ChunkAppended(ChunkInfo),
    /// Encoder runtime failure; the engine is back in idle and the partial
    /// recording was discarded
    Failed(String),
}

#[derive(Debug, Default)]
struct EngineShared {
    state: RecordingState,
    session: Option<RecordingSession>,
    artifact: Option<Artifact>,
}

impl EngineShared {
    /// Apply `action` if the table accepts it
    fn apply(&mut self, action: RecordingAction) -> Option<RecordingState> {
        let next = transition(self.state, action)?;
        self.state = next;
        Some(next)
    }
}

/// Drives one encoder through the recording lifecycle and accumulates its
/// chunks into the final artifact
pub struct RecordingEngine {
    factory: Arc<dyn EncoderFactory>,
    settings: RecorderSettings,
    shared: Arc<Mutex<EngineShared>>,
    encoder: Option<Box<dyn Encoder>>,
    pump: Option<JoinHandle<()>>,
    events: broadcast::Sender<EngineEvent>,
}

impl RecordingEngine {
    pub fn new(factory: Arc<dyn EncoderFactory>, settings: RecorderSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            factory,
            settings,
            shared: Arc::new(Mutex::new(EngineShared::default())),
            encoder: None,
            pump: None,
            events,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.shared.lock().state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// True while an encoder instance exists
    pub fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    /// Finalized recording, if stopped
    pub fn artifact(&self) -> Option<Artifact> {
        self.shared.lock().artifact.clone()
    }

    /// Stats for the in-progress recording
    pub fn stats(&self) -> Option<SessionStats> {
        let shared = self.shared.lock();
        shared.session.as_ref().map(|s| s.stats(shared.state))
    }

    /// Start encoding `stream`. Accepted only from idle.
    pub async fn start(&mut self, stream: &ComposedStream) -> RecorderResult<()> {
        let state = self.state();
        if state != RecordingState::Idle {
            return Err(RecorderError::InvalidState {
                action: RecordingAction::Start.name(),
                state,
            });
        }

        let mime_type = negotiate_mime_type(self.factory.as_ref())?;
        let options = EncoderOptions {
            mime_type: mime_type.to_string(),
            video_bits_per_second: self.settings.video_bits_per_second,
            timeslice: self.settings.timeslice(),
            frame_rate: self.settings.canvas_frame_rate,
        };

        let mut encoder = self.factory.create(options)?;
        let rx = encoder.start(stream).await?;
        info!(
            "Recording started with {} ({} video, {} audio tracks)",
            encoder.name(),
            stream.video_track_count(),
            stream.audio_track_count()
        );

        {
            let mut shared = self.shared.lock();
            shared.session = Some(RecordingSession::new(mime_type));
            shared.artifact = None;
            shared.apply(RecordingAction::Start);
        }
        self.encoder = Some(encoder);
        self.pump = Some(tokio::spawn(pump(
            rx,
            Arc::clone(&self.shared),
            self.events.clone(),
        )));
        self.emit(EngineEvent::StateChanged(RecordingState::Recording));
        Ok(())
    }

    /// Suspend encoding. No-op unless recording.
    pub async fn pause(&mut self) -> RecorderResult<()> {
        self.toggle_pause(RecordingAction::Pause).await
    }

    /// Continue encoding. No-op unless paused.
    pub async fn resume(&mut self) -> RecorderResult<()> {
        self.toggle_pause(RecordingAction::Resume).await
    }

    async fn toggle_pause(&mut self, action: RecordingAction) -> RecorderResult<()> {
        let state = self.state();
        if transition(state, action).is_none() {
            debug!("Ignoring {} while {}", action.name(), state);
            return Ok(());
        }
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(());
        };

        match action {
            RecordingAction::Pause => encoder.pause().await?,
            _ => encoder.resume().await?,
        }

        let next = self.shared.lock().apply(action);
        if let Some(next) = next {
            info!("Recording {}", next);
            self.emit(EngineEvent::StateChanged(next));
        }
        Ok(())
    }

    /// Flush the encoder and finalize the artifact.
    ///
    /// Idempotent: once stopped, returns the same artifact again. Returns
    /// `None` from idle.
    pub async fn stop(&mut self) -> RecorderResult<Option<Artifact>> {
        match self.state() {
            RecordingState::Stopped => return Ok(self.artifact()),
            RecordingState::Idle => return Ok(None),
            RecordingState::Recording | RecordingState::Paused => {}
        }

        let flushed = match self.encoder.as_mut() {
            Some(encoder) => encoder.stop().await,
            None => Ok(()),
        };
        self.encoder = None;
        if let Some(pump) = self.pump.take() {
            if let Err(e) = pump.await {
                error!("Chunk pump task failed: {}", e);
            }
        }

        if let Err(e) = flushed {
            self.fail(e.to_string());
            return Err(e);
        }

        let artifact = {
            let mut shared = self.shared.lock();
            if shared.state == RecordingState::Idle {
                // The pump saw a runtime error while flushing
                return Err(RecorderError::EncoderRuntimeError(
                    "encoder failed while stopping".to_string(),
                ));
            }
            let session = shared
                .session
                .take()
                .unwrap_or_else(|| RecordingSession::new(String::new()));
            let artifact = session.finalize();
            shared.artifact = Some(artifact.clone());
            shared.apply(RecordingAction::Stop);
            artifact
        };

        info!(
            "Recording stopped: {} bytes in {} chunks ({})",
            artifact.len(),
            artifact.chunk_count(),
            artifact.mime_type()
        );
        self.emit(EngineEvent::StateChanged(RecordingState::Stopped));
        Ok(Some(artifact))
    }

    /// Force-stop if active and discard everything recorded
    pub fn reset(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if self.encoder.take().is_some() {
            warn!("Resetting an active recording, discarding its data");
        }

        let changed = {
            let mut shared = self.shared.lock();
            let changed = shared.state != RecordingState::Idle;
            shared.session = None;
            shared.artifact = None;
            shared.apply(RecordingAction::Reset);
            changed
        };
        if changed {
            info!("Recording reset");
            self.emit(EngineEvent::StateChanged(RecordingState::Idle));
        }
    }

    fn fail(&mut self, message: String) {
        self.encoder = None;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if fail_shared(&self.shared) {
            error!("Recording failed: {}", message);
            self.emit(EngineEvent::Failed(message));
            self.emit(EngineEvent::StateChanged(RecordingState::Idle));
        }
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for RecordingEngine {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Move to idle and discard the partial recording. Returns false if the
/// state did not accept the failure.
fn fail_shared(shared: &Mutex<EngineShared>) -> bool {
    let mut shared = shared.lock();
    if shared.apply(RecordingAction::Fail).is_none() {
        return false;
    }
    shared.session = None;
    true
}

/// Move encoder output into the session in arrival order
async fn pump(
    mut rx: mpsc::Receiver<EncoderEvent>,
    shared: Arc<Mutex<EngineShared>>,
    events: broadcast::Sender<EngineEvent>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            EncoderEvent::Chunk(bytes) => {
                let info = shared
                    .lock()
                    .session
                    .as_mut()
                    .and_then(|session| session.append(bytes));
                if let Some(info) = info {
                    let _ = events.send(EngineEvent::ChunkAppended(info));
                }
            }
            EncoderEvent::Error(message) => {
                if fail_shared(&shared) {
                    error!("Encoder runtime error: {}", message);
                    let _ = events.send(EngineEvent::Failed(message));
                    let _ = events.send(EngineEvent::StateChanged(RecordingState::Idle));
                }
                break;
            }
        }
    }
    debug!("Chunk pump finished");
}
