use serde::{Deserialize, Serialize};

/// Distance between the overlay and the nearest canvas edges
pub const OVERLAY_PADDING: i64 = 20;

/// Corner the webcam overlay is anchored to
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

/// Overlay size preset
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OverlaySize {
    Small,
    #[default]
    Medium,
    Large,
}

impl OverlaySize {
    /// Fixed pixel dimensions (width, height)
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            OverlaySize::Small => (160, 120),
            OverlaySize::Medium => (240, 180),
            OverlaySize::Large => (320, 240),
        }
    }
}

/// Placement of the webcam overlay.
///
/// May change at any time; it only affects frames drawn afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayLayout {
    pub position: OverlayPosition,
    pub size: OverlaySize,
}

/// Overlay block in canvas coordinates. May extend past a canvas smaller
/// than the overlay; drawing clips it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl OverlayLayout {
    pub fn new(position: OverlayPosition, size: OverlaySize) -> Self {
        Self { position, size }
    }

    /// Overlay block for a canvas of the given size
    pub fn rect(&self, canvas_width: u32, canvas_height: u32) -> OverlayRect {
        let (width, height) = self.size.dimensions();
        let right = canvas_width as i64 - width as i64 - OVERLAY_PADDING;
        let bottom = canvas_height as i64 - height as i64 - OVERLAY_PADDING;

        let (x, y) = match self.position {
            OverlayPosition::TopLeft => (OVERLAY_PADDING, OVERLAY_PADDING),
            OverlayPosition::TopRight => (right, OVERLAY_PADDING),
            OverlayPosition::BottomLeft => (OVERLAY_PADDING, bottom),
            OverlayPosition::BottomRight => (right, bottom),
        };

        OverlayRect {
            x,
            y,
            width,
            height,
        }
    }
}

/// Which sources go into the composed stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionConfig {
    pub layout: OverlayLayout,
    pub webcam_enabled: bool,
    pub microphone_enabled: bool,
    pub system_audio_enabled: bool,
    /// Microphone to open when the microphone is enabled
    pub microphone_device_id: Option<String>,
}
