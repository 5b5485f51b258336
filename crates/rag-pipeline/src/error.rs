//! Error types for the pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure class used to decide retry and transport status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// A required endpoint or credential is absent
    Configuration,
    /// Network failure or 5xx-equivalent from a collaborator
    Transient,
    /// Bad payload encoding or unsupported input
    MalformedInput,
    /// A collaborator answered with an unexpected shape
    MalformedResponse,
    /// Bug or invariant violation inside this process
    Internal,
}

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or unsupported input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Remote collaborator failed in a way worth retrying
    #[error("{service} request failed: {message}")]
    Remote { service: String, message: String },

    /// Remote collaborator answered with an unexpected shape
    #[error("Unexpected {service} response: {message}")]
    MalformedResponse { service: String, message: String },

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A job write that would move a job backwards in its lifecycle
    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    /// All retry attempts were used up (or the failure was not retryable)
    #[error("{source} (after {attempts} attempt(s))")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a retryable remote error
    pub fn remote(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a malformed collaborator response error
    pub fn malformed(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Config(_) => ErrorClass::Configuration,
            Error::InvalidInput(_) | Error::NotFound(_) => ErrorClass::MalformedInput,
            Error::Remote { .. } | Error::Io(_) | Error::Http(_) => ErrorClass::Transient,
            Error::MalformedResponse { .. } | Error::Json(_) => ErrorClass::MalformedResponse,
            Error::InvalidTransition { .. } | Error::Internal(_) => ErrorClass::Internal,
            Error::RetryExhausted { source, .. } => source.class(),
        }
    }

    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Number of attempts made before this error surfaced (1 when no retry wrapper ran)
    pub fn attempts(&self) -> u32 {
        match self {
            Error::RetryExhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }

    /// The innermost error, skipping retry wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::RetryExhausted { source, .. } => source.root(),
            other => other,
        }
    }
}

impl ErrorClass {
    /// HTTP status used when a failure of this class ends a request
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorClass::MalformedInput => StatusCode::BAD_REQUEST,
            ErrorClass::Configuration | ErrorClass::Transient | ErrorClass::MalformedResponse => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match self.root() {
            Error::Config(_) => (StatusCode::SERVICE_UNAVAILABLE, "config_error"),
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Remote { .. } => (StatusCode::SERVICE_UNAVAILABLE, "remote_error"),
            Error::MalformedResponse { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "malformed_response")
            }
            Error::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            Error::Io(_) => (StatusCode::SERVICE_UNAVAILABLE, "io_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "http_error"),
            Error::Internal(_) | Error::RetryExhausted { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
