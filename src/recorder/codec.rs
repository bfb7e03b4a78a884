use tracing::{debug, info};

use super::encoder::EncoderFactory;
use crate::error::{RecorderError, RecorderResult};

/// Container/codec candidates, most preferred first
pub const MIME_PREFERENCE: [&str; 4] = [
    "video/webm;codecs=vp9",
    "video/webm;codecs=vp8",
    "video/webm",
    "video/mp4",
];

/// Pick the first entry of [`MIME_PREFERENCE`] the factory supports
pub fn negotiate_mime_type(factory: &dyn EncoderFactory) -> RecorderResult<&'static str> {
    for candidate in MIME_PREFERENCE {
        if factory.is_type_supported(candidate) {
            info!("Negotiated recording format {}", candidate);
            return Ok(candidate);
        }
        debug!("Recording format {} not supported", candidate);
    }
    Err(RecorderError::EncoderInitFailed(
        "no supported container/codec".to_string(),
    ))
}

/// Base MIME type without codec parameters
pub fn container_type(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or(mime_type).trim()
}

/// File extension matching a MIME type's container
pub fn file_extension(mime_type: &str) -> &'static str {
    match container_type(mime_type) {
        "video/mp4" => "mp4",
        "video/x-matroska" => "mkv",
        _ => "webm",
    }
}
