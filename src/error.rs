//! Error types for liveloop.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LiveloopError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Capability probing errors (always absorbed behind a default profile,
    // surfaced only through logs)
    #[error("Capability detection failed: {message}")]
    Detection { message: String },

    // Turn queue cancellation — distinct from any transport failure so turn
    // loops can tell forced teardown apart from normal drain-to-completion.
    #[error("Queue cleared")]
    QueueCleared,

    // Audio errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Audio output failed: {message}")]
    AudioOutput { message: String },

    #[error("Audio decode failed: {message}")]
    AudioDecode { message: String },

    // Streaming session errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Session closed")]
    SessionClosed,

    // Rendering errors
    #[error("Render context lost: {message}")]
    RenderContext { message: String },

    #[error("No render strategy registered for tier {tier}")]
    NoStrategy { tier: String },

    // Message parsing errors
    #[error("Malformed server message: {0}")]
    Message(#[from] serde_json::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl LiveloopError {
    /// Returns true when this error is the turn-queue cancellation signal.
    pub fn is_queue_cleared(&self) -> bool {
        matches!(self, LiveloopError::QueueCleared)
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, LiveloopError>;
