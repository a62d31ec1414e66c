//! Custom error types for the parakeet endpoint.
//!
//! This module provides a centralized error handling system using the `thiserror` crate
//! to define structured, typed errors with clear messages and proper error conversion.
//! Handlers return [`AppError`] and the HTTP status is decided in one place, the
//! [`IntoResponse`] implementation below.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::io;
use thiserror::Error;

use crate::constants::http::RETRY_AFTER_SECS;

/// Errors raised by a speech model backend.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The runtime could not be reached or does not serve the model yet.
    #[error("model runtime unavailable: {0}")]
    Unavailable(String),

    /// Transport failure while talking to the runtime.
    #[error("model request failed: {0}")]
    Request(String),

    /// The runtime answered with a non-success status.
    #[error("model runtime returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The runtime answered with a payload we could not interpret.
    #[error("unexpected model output: {0}")]
    InvalidOutput(String),

    /// The backend panicked while serving a call.
    #[error("model call panicked: {0}")]
    Panicked(String),

    /// Local IO while preparing a model call.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Primary error type for the application, covering all possible error cases.
#[derive(Debug, Error)]
pub enum AppError {
    /// The request carried no usable `audio` field.
    #[error("Missing 'audio' field")]
    MissingAudio,

    /// Errors from invalid input data or parameters.
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    /// Audio could not be decoded, read or fetched.
    #[error("Failed to process audio data: {0}")]
    AudioDecode(String),

    /// The request body exceeds the configured limit.
    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    /// The request media type is not JSON.
    #[error("Unsupported content type: {0}")]
    UnsupportedMediaType(String),

    /// The model is still loading or failed to load.
    #[error("Service unavailable: {0}")]
    NotReady(String),

    /// Errors occurring during model inference.
    #[error("Transcription failed: {0}")]
    Inference(#[from] ModelError),

    /// Errors from invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors from the underlying IO system.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal server errors.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingAudio | AppError::InvalidInput(_) | AppError::AudioDecode(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Inference(_)
            | AppError::Config(_)
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Implementation to convert AppError into an HTTP response for Axum.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
        }));

        let mut response = (status, body).into_response();
        if matches!(self, AppError::NotReady(_)) {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(RETRY_AFTER_SECS),
            );
        }
        response
    }
}

/// Convenience type alias for Results with AppError.
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors raised while managing hosted endpoint resources.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Deploy settings are missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A management call was rejected or could not be sent.
    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    /// The named resource does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The endpoint reached the `Failed` status.
    #[error("Endpoint {endpoint} failed: {reason}")]
    EndpointFailed { endpoint: String, reason: String },

    /// Polling gave up before the endpoint reached the wanted state.
    #[error("Endpoint {endpoint} not {waiting_for} after {attempts} attempts")]
    Timeout {
        endpoint: String,
        waiting_for: &'static str,
        attempts: u32,
    },

    /// A management response lacked a field we depend on.
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

/// Errors raised by the benchmark client.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The invocation could not be sent or was rejected by the transport.
    #[error("Invocation failed: {0}")]
    Invoke(String),

    /// The endpoint answered with something other than a JSON object.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The first response carried an `error` field.
    #[error("Endpoint returned an error: {0}")]
    Endpoint(String),

    /// No iteration succeeded.
    #[error("All {0} iterations failed")]
    NoSuccessfulIterations(usize),

    /// Local IO, typically reading the audio file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
