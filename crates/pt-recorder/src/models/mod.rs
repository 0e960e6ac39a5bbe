//! Reservation and channel models as served by the backend API

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::errors::AppError;

/// Shortest recordable window
pub const MIN_RECORD_SECS: i64 = 60;
/// Longest recordable window
pub const MAX_RECORD_SECS: i64 = 24 * 60 * 60;

/// Characters rejected in titles and categories: control characters,
/// quotes, `*`, `+`, comma and slash. They would break the capture
/// output path or the backend's listing pages.
const INVALID_CHARS: &str = "[\\x00-\\x1F\\x22-\\x27\\x2a-\\x2c\\x2f]";

const MAX_NAME_LEN: usize = 64;

/// A recording reservation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvRecord {
    pub id: Uuid,
    pub title: String,
    /// Category name
    pub category: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// Channel ID
    pub cid: String,
    /// Signal ID
    pub sid: String,
    /// User ID
    pub uid: String,
    /// Tuner input index
    #[serde(default)]
    pub input_idx: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TvRecord {
    pub fn new(
        title: &str,
        category: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        cid: &str,
        sid: &str,
        uid: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            category: category.to_string(),
            start_at,
            end_at,
            cid: cid.to_string(),
            sid: sid.to_string(),
            uid: uid.to_string(),
            input_idx: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> String {
        self.id.to_string()
    }

    pub fn record_time(&self) -> chrono::Duration {
        self.end_at - self.start_at
    }

    /// Validate field contents and window length.
    ///
    /// Overlap between reservations is deliberately not checked here; it
    /// is surfaced through the backend's listing and resolved manually.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("title", &self.title)?;
        validate_name("category", &self.category)?;
        validate_required("cid", &self.cid)?;
        validate_required("sid", &self.sid)?;
        validate_required("uid", &self.uid)?;

        let secs = self.record_time().num_seconds();
        if secs < MIN_RECORD_SECS {
            return Err(ValidationError::WindowTooShort { secs });
        }
        if secs > MAX_RECORD_SECS {
            return Err(ValidationError::WindowTooLong { secs });
        }
        Ok(())
    }
}

/// A tunable channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvChannel {
    pub cid: String,
    pub sid: String,
    pub name: String,
}

impl TvChannel {
    pub fn key(&self) -> String {
        format!("{}.{}", self.cid, self.sid)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_required("cid", &self.cid)?;
        validate_required("sid", &self.sid)?;
        validate_required("name", &self.name)?;
        Ok(())
    }
}

/// Model validation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("field '{field}' is required")]
    Required { field: &'static str },

    #[error("field '{field}' contains invalid characters")]
    InvalidChars { field: &'static str },

    #[error("field '{field}' must be at most {max} characters long (got {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("recording window is too short: {secs}s")]
    WindowTooShort { secs: i64 },

    #[error("recording window is too long: {secs}s")]
    WindowTooLong { secs: i64 },
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Validation {
            message: e.to_string(),
        }
    }
}

fn validate_required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Required { field });
    }
    Ok(())
}

fn validate_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    validate_required(field, value)?;

    let chars = value.chars().count();
    if chars > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_NAME_LEN,
            actual: chars,
        });
    }

    let invalid = Regex::new(INVALID_CHARS).expect("invalid-character class must compile");
    if invalid.is_match(value) {
        return Err(ValidationError::InvalidChars { field });
    }
    Ok(())
}
