use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{CamringError, Result};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Capture device parameters.
    pub capture: CaptureConfig,
    /// Recording storage parameters.
    pub storage: StorageConfig,
}

/// Capture device parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    /// Device node to read frames from.
    #[serde(default = "default_device")]
    pub device: PathBuf,
    /// Declared frame rate of the stream.
    #[serde(default = "default_fps")]
    pub fps: u8,
    #[serde(default = "default_width")]
    pub width: u16,
    #[serde(default = "default_height")]
    pub height: u16,
    /// Device-side buffer slots in flight.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Upper bound for one compressed frame.
    #[serde(default = "default_frame_buffer_kb")]
    pub frame_buffer_kb: usize,
}

/// Storage parameters for the rotation set.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding the idx_/frm_ pairs.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    /// Combined size limit of one index+frame pair in megabytes.
    #[serde(default = "default_file_size_limit_mb")]
    pub file_size_limit_mb: u64,
    /// Rotation horizon: slot names wrap after this many pairs.
    /// 0 disables wrapping (the set grows without bound).
    #[serde(default = "default_max_files")]
    pub max_files: u32,
    /// Staging ring capacity in megabytes (writer thread only).
    #[serde(default = "default_ring_capacity_mb")]
    pub ring_capacity_mb: usize,
    /// Route disk writes through the dedicated writer thread.
    #[serde(default = "default_writer_thread")]
    pub writer_thread: bool,
}

fn default_device() -> PathBuf { PathBuf::from("/dev/video0") }
fn default_fps() -> u8 { 30 }
fn default_width() -> u16 { 1280 }
fn default_height() -> u16 { 720 }
fn default_queue_depth() -> usize { 8 }
fn default_frame_buffer_kb() -> usize { 1024 }

fn default_dir() -> PathBuf { PathBuf::from(".") }
fn default_file_size_limit_mb() -> u64 { 128 }
fn default_max_files() -> u32 { 32 }
fn default_ring_capacity_mb() -> usize { 90 }
fn default_writer_thread() -> bool { true }

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CamringError::Config(format!("Cannot read config file: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| CamringError::Config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.capture.fps == 0 {
            return Err(CamringError::Config("fps must be > 0".into()));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(CamringError::Config("frame geometry must be > 0".into()));
        }
        if self.capture.queue_depth == 0 {
            return Err(CamringError::Config("queue_depth must be > 0".into()));
        }
        if self.capture.frame_buffer_kb == 0 {
            return Err(CamringError::Config("frame_buffer_kb must be > 0".into()));
        }
        if self.storage.file_size_limit_mb == 0 {
            return Err(CamringError::Config("file_size_limit_mb must be > 0".into()));
        }
        if self.storage.writer_thread && self.storage.ring_capacity_mb == 0 {
            return Err(CamringError::Config(
                "ring_capacity_mb must be > 0 when the writer thread is enabled".into(),
            ));
        }
        Ok(())
    }
}
