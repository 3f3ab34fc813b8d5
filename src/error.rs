// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CamringError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Structural corruption: {0}")]
    Corrupt(String),

    #[error("Staging ring full, record refused")]
    Backpressure,

    #[error("Frame data unavailable: {0}")]
    FrameData(String),

    #[error("Resource exhausted: {0}")]
    Exhausted(String),
}

pub type Result<T> = std::result::Result<T, CamringError>;
