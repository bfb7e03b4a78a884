use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub recorder: RecorderSettings,
    pub output: OutputConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "gorec".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 7878,
        }
    }
}

/// Capture and encoding parameters used by the orchestrator
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    /// Target encoder video bitrate
    pub video_bits_per_second: u32,
    /// Interval between encoder chunk emissions
    pub timeslice_ms: u64,
    /// Frame rate of the synthesized overlay track
    pub canvas_frame_rate: u32,
    /// Ideal frame rate requested from the screen picker
    pub screen_frame_rate: u32,
    /// How long to wait for each source to produce its first frame
    pub readiness_timeout_ms: u64,
    /// Extra wait after readiness before the first overlay frame is drawn
    pub settle_delay_ms: u64,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            video_bits_per_second: 2_500_000,
            timeslice_ms: 1000,
            canvas_frame_rate: 30,
            screen_frame_rate: 30,
            readiness_timeout_ms: 3000,
            settle_delay_ms: 100,
        }
    }
}

impl RecorderSettings {
    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory local downloads are written to
    pub downloads_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            downloads_path: PathBuf::from("recordings"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest artifact accepted for upload
    pub max_bytes: u64,
    /// Uploads allowed per window
    pub rate_limit: usize,
    pub rate_window_secs: u64,
    /// Base of public object URLs
    pub storage_url: String,
    /// Base of `/watch/<token>` share links
    pub share_base_url: String,
    /// Account uploads are made under; unset means signed out
    pub user_id: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 524_288_000, // 500MB
            rate_limit: 5,
            rate_window_secs: 60,
            storage_url: "http://localhost:54321".to_string(),
            share_base_url: "http://localhost:7878".to_string(),
            user_id: None,
        }
    }
}

impl Config {
    /// Load configuration from `path` (any format the `config` crate recognises).
    /// A missing file yields the defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("GOREC").separator("__"))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }
}
