//! Common error types for vrject.

use thiserror::Error;

/// Result type alias using vrject's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for vrject operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file, console, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Call-table interception failed
    #[error("hook error: {0}")]
    Hook(String),

    /// D3D11 device or resource failure
    #[error("graphics error: {0}")]
    Graphics(String),

    /// OpenXR runtime failure
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Feature not available on this platform
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Create a hook error from any displayable type.
    pub fn hook(msg: impl std::fmt::Display) -> Self {
        Self::Hook(msg.to_string())
    }

    /// Create a graphics error from any displayable type.
    pub fn graphics(msg: impl std::fmt::Display) -> Self {
        Self::Graphics(msg.to_string())
    }

    /// Create a runtime error from any displayable type.
    pub fn runtime(msg: impl std::fmt::Display) -> Self {
        Self::Runtime(msg.to_string())
    }

    /// Create a config error from any displayable type.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create an unsupported error from any displayable type.
    pub fn unsupported(msg: impl std::fmt::Display) -> Self {
        Self::Unsupported(msg.to_string())
    }
}
