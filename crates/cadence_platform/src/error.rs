//! Timing error types

use thiserror::Error;

/// Errors raised by timer hosts and timing environments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimingError {
    /// The host could not install a repeating timer
    #[error("Timer unavailable: {0}")]
    TimerUnavailable(String),

    /// The environment cannot deliver before-paint callbacks
    #[error("Paint callbacks unavailable: {0}")]
    PaintUnavailable(String),

    /// Rejected scheduler configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An animation failed while handling a frame
    #[error("Animation error: {0}")]
    Animation(String),

    /// Generic host failure
    #[error("Host error: {0}")]
    Host(String),
}

/// Result type for timing operations
pub type Result<T> = std::result::Result<T, TimingError>;
