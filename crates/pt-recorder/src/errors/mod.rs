//! Centralized error handling for the pt-recorder application
//!
//! Unifies the error types of the backend client, the capture capability
//! and the configuration layer under a single `AppError`, so services can
//! return `AppResult<T>` regardless of which collaborator failed.

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;
