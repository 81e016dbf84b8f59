//! Frame-level errors for STOMP encoding and decoding
//!
//! Each variant carries enough context to tell a truncated stream apart from
//! a peer that is speaking something other than STOMP.

use thiserror::Error;

/// Result type for codec operations
pub type StompResult<T> = Result<T, StompError>;

/// STOMP codec errors
#[derive(Debug, Error)]
pub enum StompError {
    /// Underlying stream failure surfaced through `Framed`
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bytes on the wire do not form a valid frame
    #[error("Malformed frame: {message}")]
    Malformed { message: String },

    /// Frame exceeds the configured size limit
    #[error("Frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },
}

impl StompError {
    /// Create a malformed frame error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create a frame size error
    pub fn frame_too_large(size: usize, max: usize) -> Self {
        Self::FrameTooLarge { size, max }
    }

    /// Get error category for log fields
    pub fn category(&self) -> &'static str {
        match self {
            StompError::Io(_) => "io",
            StompError::Malformed { .. } => "malformed",
            StompError::FrameTooLarge { .. } => "frame_too_large",
        }
    }
}
