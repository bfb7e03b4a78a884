use image::RgbaImage;
use std::sync::Arc;

/// Audio stream source type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioStreamSource {
    /// System audio captured alongside the screen
    System,
    /// Microphone input
    Microphone,
}

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the source was opened
    pub timestamp_ms: u64,
    /// Audio stream source (system or microphone)
    pub source: AudioStreamSource,
}

impl AudioFrame {
    /// Duration covered by this frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let per_channel = self.samples.len() as u64 / self.channels as u64;
        per_channel * 1000 / self.sample_rate as u64
    }
}

/// A decoded video frame.
///
/// Clones share the pixel buffer, so handing the latest frame to several
/// consumers (compositor, encoder, preview) does not copy it. A producer
/// that draws into a reusable canvas copies once per published frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    image: Arc<RgbaImage>,
    /// Timestamp in milliseconds since the source was opened
    pub timestamp_ms: u64,
}

impl VideoFrame {
    pub fn new(image: RgbaImage, timestamp_ms: u64) -> Self {
        Self::shared(Arc::new(image), timestamp_ms)
    }

    pub fn shared(image: Arc<RgbaImage>, timestamp_ms: u64) -> Self {
        Self {
            image,
            timestamp_ms,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_frame_clones_share_pixels() {
        let frame = VideoFrame::new(RgbaImage::new(4, 2), 7);
        let copy = frame.clone();
        assert!(std::ptr::eq(frame.image(), copy.image()));
        assert_eq!((copy.width(), copy.height(), copy.timestamp_ms), (4, 2, 7));
    }

    #[test]
    fn test_audio_frame_duration() {
        let frame = AudioFrame {
            samples: vec![0i16; 9600], // 100ms of 48kHz stereo
            sample_rate: 48000,
            channels: 2,
            timestamp_ms: 0,
            source: AudioStreamSource::Microphone,
        };
        assert_eq!(frame.duration_ms(), 100);
    }

    #[test]
    fn test_video_frame_clone_shares_pixels() {
        let frame = VideoFrame::new(RgbaImage::new(4, 2), 33);
        let cloned = frame.clone();
        assert!(std::ptr::eq(frame.image(), cloned.image()));
        assert_eq!((cloned.width(), cloned.height()), (4, 2));
    }
}
