//! # Error Handling
//!
//! Two error families live here:
//!
//! - **`AppError`**: errors surfaced through the HTTP API (config endpoints,
//!   session endpoints). Converted to JSON responses via `ResponseError`.
//! - **`PipelineError`**: the per-turn failure taxonomy of the message
//!   pipeline. These never become HTTP responses; the orchestrator maps them
//!   to WebSocket error frames or recovers from them locally.
//!
//! ## Pipeline failure policy:
//! - Fatal to the turn: `SessionNotFound`, `AudioDecode`, `Stt`,
//!   `UpstreamUnavailable`. The turn ends with a single terminal error frame.
//! - Recovered locally: `Classification` (fallback intent), `Translation`
//!   (original text used), `Synthesis` (text-only payload with a soft flag).

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors returned by the HTTP API surface.
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (lock poisoning, serialization, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

/// Converts `AppError` values into consistent JSON error responses.
///
/// ## HTTP Status Code Mapping:
/// - Internal/ConfigError → 500 (Internal Server Error)
/// - BadRequest/ValidationError → 400 (Bad Request)
/// - NotFound → 404 (Not Found)
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;

/// Per-turn failures inside the message pipeline.
///
/// Each variant carries a detail string for logging; clients only ever see
/// the sanitized text from [`PipelineError::user_message`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// No session is registered for the client id
    SessionNotFound(String),

    /// Inbound audio bytes could not be decoded into PCM samples
    AudioDecode(String),

    /// Speech-to-text failed or produced an empty transcript
    Stt(String),

    /// Intent classification failed (recovered via the fallback intent)
    Classification(String),

    /// Translation failed (recovered by using the untranslated text)
    Translation(String),

    /// Speech synthesis failed (turn degrades to text-only)
    Synthesis(String),

    /// An external service is not configured (missing URL or credentials)
    UpstreamUnavailable(String),
}

impl PipelineError {
    /// Whether this failure must terminate the turn with an error frame.
    ///
    /// Non-fatal variants are handled at their stage and never reach the
    /// terminal frame; see the module docs for the recovery per variant.
    pub fn is_turn_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::SessionNotFound(_)
                | PipelineError::AudioDecode(_)
                | PipelineError::Stt(_)
                | PipelineError::UpstreamUnavailable(_)
        )
    }

    /// Human-readable message for the terminal error frame.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::SessionNotFound(_) => {
                "Session not found. Please reconnect and try again.".to_string()
            }
            PipelineError::AudioDecode(detail) => {
                format!("Error processing audio: {}", detail)
            }
            PipelineError::Stt(_) => {
                "Could not understand the audio. Please try speaking again.".to_string()
            }
            PipelineError::UpstreamUnavailable(service) => {
                format!("{} service unavailable.", service)
            }
            // Recovered-locally variants never surface; keep a sane message
            // in case one ever reaches the terminal frame through a bug.
            PipelineError::Classification(_)
            | PipelineError::Translation(_)
            | PipelineError::Synthesis(_) => "AI failed to generate a response.".to_string(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::SessionNotFound(id) => write!(f, "session not found: {}", id),
            PipelineError::AudioDecode(msg) => write!(f, "audio decode failed: {}", msg),
            PipelineError::Stt(msg) => write!(f, "speech-to-text failed: {}", msg),
            PipelineError::Classification(msg) => write!(f, "classification failed: {}", msg),
            PipelineError::Translation(msg) => write!(f, "translation failed: {}", msg),
            PipelineError::Synthesis(msg) => write!(f, "speech synthesis failed: {}", msg),
            PipelineError::UpstreamUnavailable(msg) => write!(f, "service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(PipelineError::SessionNotFound("web-1".into()).is_turn_fatal());
        assert!(PipelineError::AudioDecode("bad header".into()).is_turn_fatal());
        assert!(PipelineError::Stt("empty transcript".into()).is_turn_fatal());
        assert!(PipelineError::UpstreamUnavailable("STT".into()).is_turn_fatal());

        assert!(!PipelineError::Classification("timeout".into()).is_turn_fatal());
        assert!(!PipelineError::Translation("timeout".into()).is_turn_fatal());
        assert!(!PipelineError::Synthesis("timeout".into()).is_turn_fatal());
    }

    #[test]
    fn test_user_message_hides_detail() {
        let err = PipelineError::Stt("upstream returned 500: secret".into());
        assert!(!err.user_message().contains("secret"));
    }
}
