//! Error types for the glance-core library.
//!
//! Failures are grouped by the operation that produces them: capture errors
//! end a selection attempt with no image, analysis errors end one query, and
//! [`AppError`] wraps both for the facade and the CLI.

use thiserror::Error;

/// Errors from acquiring a single frame of a display.
///
/// All variants are terminal for the current selection attempt. The selection
/// machinery turns them into "no image produced"; nothing retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The requested display is not in the live display list (e.g. unplugged
    /// between selection and capture).
    #[error("No capturable display matches id {0}")]
    NoMatchingDisplay(u32),

    /// The capture session could not be opened or started.
    #[error("Capture session failed to start: {0}")]
    SessionStartFailed(String),

    /// The session ended, errored or timed out before producing a frame.
    #[error("No frame delivered: {0}")]
    NoFrameDelivered(String),
}

impl CaptureError {
    /// Creates a session start error with the given message.
    pub fn start(msg: impl Into<String>) -> Self {
        Self::SessionStartFailed(msg.into())
    }

    /// Creates a missing frame error with the given message.
    pub fn no_frame(msg: impl Into<String>) -> Self {
        Self::NoFrameDelivered(msg.into())
    }
}

/// Errors from encoding an image or streaming an analysis.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// The image could not be re-encoded (zero-size buffer, encoder failure).
    #[error("Failed to convert image to required format")]
    ImageConversionFailed,

    /// The encoded bytes are empty or do not decode as an image.
    #[error("Invalid image data provided")]
    InvalidImageData,

    /// Any remote failure (auth, network, rate limit), described by the
    /// transport.
    #[error("API Error: {0}")]
    ApiError(String),
}

impl AnalysisError {
    /// Creates an API error with the given message.
    pub fn api(msg: impl Into<String>) -> Self {
        Self::ApiError(msg.into())
    }
}

/// Errors that can occur within the glance-core library.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (invalid values, bad URLs).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Screen capture failed.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Encoding or streaming analysis failed.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// UI-related errors (window creation, event loop).
    #[error("UI error: {0}")]
    Ui(String),
}

impl AppError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a UI error with the given message.
    pub fn ui(msg: impl Into<String>) -> Self {
        Self::Ui(msg.into())
    }
}

/// A convenient alias for Result with [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_messages_are_user_facing() {
        assert_eq!(
            AnalysisError::ImageConversionFailed.to_string(),
            "Failed to convert image to required format"
        );
        assert_eq!(
            AnalysisError::InvalidImageData.to_string(),
            "Invalid image data provided"
        );
        assert_eq!(
            AnalysisError::api("401 Unauthorized").to_string(),
            "API Error: 401 Unauthorized"
        );
    }

    #[test]
    fn app_error_wraps_domain_errors_transparently() {
        let err: AppError = CaptureError::NoMatchingDisplay(7).into();
        assert_eq!(err.to_string(), "No capturable display matches id 7");
    }
}
