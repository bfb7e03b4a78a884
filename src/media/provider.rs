use serde::{Deserialize, Serialize};

use super::source::MediaSource;
use crate::error::RecorderResult;

/// Kind of surface requested from the screen picker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplaySurface {
    Monitor,
    Window,
    Browser,
}

/// Constraints for a screen/window/tab capture
#[derive(Debug, Clone)]
pub struct ScreenConstraints {
    pub display_surface: DisplaySurface,
    /// Ideal frame rate
    pub frame_rate: u32,
    /// Also capture system audio through the picker
    pub audio: bool,
}

impl Default for ScreenConstraints {
    fn default() -> Self {
        Self {
            display_surface: DisplaySurface::Monitor,
            frame_rate: 30,
            audio: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    User,
    Environment,
}

/// Constraints for opening a camera
#[derive(Debug, Clone)]
pub struct WebcamConstraints {
    /// Preferred width, negotiable downward
    pub ideal_width: u32,
    /// Preferred height, negotiable downward
    pub ideal_height: u32,
    pub facing_mode: FacingMode,
}

impl Default for WebcamConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 640,
            ideal_height: 480,
            facing_mode: FacingMode::User,
        }
    }
}

/// Constraints for opening a microphone
#[derive(Debug, Clone)]
pub struct MicrophoneConstraints {
    /// Exact device to open
    pub device_id: String,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl MicrophoneConstraints {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// An audio input as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioInputDevice {
    pub id: String,
    /// Empty until microphone permission has been granted once
    pub label: String,
}

impl AudioInputDevice {
    /// Human-readable label, degrading to a short opaque identifier
    pub fn display_label(&self) -> String {
        if self.label.is_empty() {
            let short: String = self.id.chars().take(5).collect();
            format!("Microphone {}", short)
        } else {
            self.label.clone()
        }
    }
}

/// Device source provider trait
///
/// Implementations wrap a platform capture stack (portal/PipeWire, Windows
/// Graphics Capture, ScreenCaptureKit) or the in-tree
/// [`SyntheticDevices`](super::SyntheticDevices) test pattern generator.
///
/// Every acquire call may show an OS permission prompt and suspends until the
/// user answers. A denial is final for that call: callers must not retry
/// automatically.
#[async_trait::async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Capture a screen, window or tab
    async fn acquire_screen(&self, constraints: ScreenConstraints) -> RecorderResult<MediaSource>;

    /// Open a microphone with echo cancellation and noise suppression
    async fn acquire_microphone(
        &self,
        constraints: MicrophoneConstraints,
    ) -> RecorderResult<MediaSource>;

    /// Open the front-facing camera
    async fn acquire_webcam(&self, constraints: WebcamConstraints) -> RecorderResult<MediaSource>;

    /// List audio inputs. Labels are empty until microphone permission was granted.
    async fn enumerate_audio_inputs(&self) -> RecorderResult<Vec<AudioInputDevice>>;

    /// Stop all tracks of a source. Idempotent.
    fn release(&self, source: &mut MediaSource) {
        source.release();
    }

    /// Get provider name for logging
    fn name(&self) -> &str;
}
