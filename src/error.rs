//! # Error Handling
//!
//! This module defines the application error type and how it is converted to HTTP responses.
//!
//! ## Error Categories:
//! - **ValidationError**: The upload was rejected before any processing (400)
//! - **NotFound**: Wrong method or unknown route (404)
//! - **Processing**: The transform pipeline failed after intake accepted the upload (400)
//!
//! Start-up failures (configuration, binding) never reach a client and stay `anyhow` errors.
//!
//! ## Client-visible detail
//! Validation messages are returned as-is because they describe what the client sent.
//! Processing failures always return the same generic message; the underlying
//! engine or I/O detail goes to the log only.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

use crate::transform::TransformError;

/// Message returned for every failure that happens after intake accepted the upload.
pub const GENERIC_PROCESSING_MESSAGE: &str = "An error occurred! Please try again later.";

/// Custom error types for the application.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::ValidationError("Pitch must be between -4 and 4".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Requested resource or method was not found
    NotFound(String),

    /// Upload failed an admission rule (missing file, bad pitch, too large)
    ValidationError(String),

    /// The transform pipeline failed; the detail is logged, never sent
    Processing(TransformError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Processing(err) => write!(f, "Processing error: {}", err),
        }
    }
}

impl AppError {
    /// Machine-readable error kind used in the JSON body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::ValidationError(_) => "validation_error",
            AppError::Processing(_) => "processing_error",
        }
    }

    /// Message that is safe to show to the client.
    pub fn client_message(&self) -> String {
        match self {
            AppError::NotFound(msg) | AppError::ValidationError(msg) => msg.clone(),
            AppError::Processing(_) => GENERIC_PROCESSING_MESSAGE.to_string(),
        }
    }
}

/// Converts errors into the `{ "message": ... }` body clients expect.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "message": "Pitch must be a non-zero integer between -4 and 4",
///   "type": "validation_error",
///   "timestamp": "2025-01-01T12:00:00Z"
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_) | AppError::Processing(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "message": self.client_message(),
            "type": self.kind(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }
}

/// A body that does not parse as multipart is a client error, same class as a bad pitch.
impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::ValidationError(format!("Malformed multipart body: {}", err))
    }
}

impl From<TransformError> for AppError {
    fn from(err: TransformError) -> Self {
        AppError::Processing(err)
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;
