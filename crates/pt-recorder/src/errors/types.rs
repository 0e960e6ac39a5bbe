//! Error type definitions for the pt-recorder application

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Backend API errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Capture process errors
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Backend API specific errors
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend answered with a status code other than the expected one
    #[error("unexpected status code {actual} (expected {expected}) from {url}")]
    UnexpectedStatus {
        expected: u16,
        actual: u16,
        url: String,
    },

    /// The response body could not be decoded into the expected model
    #[error("could not decode response as {type_name}: {message} ({body:?})")]
    Decode {
        type_name: String,
        message: String,
        body: String,
    },

    /// Transport-level failures
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Capture process specific errors
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The capture command could not be spawned
    #[error("failed to spawn capture command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The capture process could not be killed
    #[error("failed to stop capture process: {0}")]
    Stop(#[source] std::io::Error),
}
