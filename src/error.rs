//! Error taxonomy for capture, composition and recording
//!
//! Every failure that can reach a user maps to a generic, localizable
//! [`Notice`]; the technical text stays in logs.

use serde::Serialize;
use thiserror::Error;

use crate::media::SourceKind;
use crate::recorder::RecordingState;

/// Errors surfaced by the device provider, compositor, recording engine and orchestrator
#[derive(Debug, Error)]
pub enum RecorderError {
    /// User or OS refused device access. The caller must not retry automatically.
    #[error("permission denied for {0} capture")]
    PermissionDenied(SourceKind),

    /// The selected hardware vanished (recoverable by re-enumeration)
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The mandatory screen video track is missing
    #[error("no screen video track available")]
    NoVideoSource,

    /// No supported container/codec, or the encoder rejected the stream
    #[error("encoder initialisation failed: {0}")]
    EncoderInitFailed(String),

    /// Mid-recording encoder failure; the partial recording is discarded
    #[error("encoder runtime error: {0}")]
    EncoderRuntimeError(String),

    /// Operation not accepted from the current lifecycle state
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: RecordingState,
    },

    /// Composition topology settings are locked once recording has started
    #[error("composition settings are locked while a recording is active")]
    SettingsLocked,

    /// No finalized recording is available
    #[error("no recording available")]
    NoArtifact,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RecorderResult<T> = Result<T, RecorderError>;

/// User-facing message (the toast equivalent)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// Stable message key for the localization layer
    pub key: String,
    /// Default English text
    pub message: String,
}

impl Notice {
    pub fn new(key: &str, message: &str) -> Self {
        Self {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    pub fn screen_denied() -> Self {
        Self::new(
            "screenDenied",
            "Screen sharing was denied. Please allow access to record.",
        )
    }

    pub fn mic_denied() -> Self {
        Self::new(
            "micDenied",
            "Microphone access was denied. Recording without audio.",
        )
    }

    pub fn webcam_denied() -> Self {
        Self::new(
            "webcamDenied",
            "Webcam access was denied. Recording without webcam.",
        )
    }

    pub fn not_supported() -> Self {
        Self::new(
            "notSupported",
            "Screen recording is not supported in this browser.",
        )
    }

    pub fn screen_ended() -> Self {
        Self::new(
            "screenEnded",
            "Screen sharing ended. Your recording has been saved.",
        )
    }

    pub fn generic() -> Self {
        Self::new("generic", "An error occurred. Please try again.")
    }
}

impl RecorderError {
    /// Map to the generic message shown to the end user
    pub fn notice(&self) -> Notice {
        match self {
            RecorderError::PermissionDenied(SourceKind::Screen) => Notice::screen_denied(),
            RecorderError::PermissionDenied(SourceKind::Microphone) => Notice::mic_denied(),
            RecorderError::PermissionDenied(SourceKind::Webcam) => Notice::webcam_denied(),
            RecorderError::EncoderInitFailed(_) => Notice::not_supported(),
            RecorderError::SettingsLocked => Notice::new(
                "settingsLocked",
                "Settings can't be changed while recording.",
            ),
            RecorderError::NoArtifact => {
                Notice::new("noRecording", "There is no recording to save yet.")
            }
            _ => Notice::generic(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notices_hide_technical_text() {
        let err = RecorderError::EncoderRuntimeError("GPU context lost (0x887a0005)".into());
        let notice = err.notice();
        assert_eq!(notice.key, "generic");
        assert!(!notice.message.contains("0x887a0005"));
    }

    #[test]
    fn test_permission_notices_by_source() {
        assert_eq!(
            RecorderError::PermissionDenied(SourceKind::Screen).notice().key,
            "screenDenied"
        );
        assert_eq!(
            RecorderError::PermissionDenied(SourceKind::Webcam).notice().key,
            "webcamDenied"
        );
        assert_eq!(
            RecorderError::PermissionDenied(SourceKind::SystemAudio).notice().key,
            "generic"
        );
    }
}
