//! Error types for dida-bridge.
//!
//! This module defines the error types used throughout the crate, providing
//! structured error handling with clear, human-readable messages.
//!
//! Only host (note store) failures travel up to callers. Remote failures are
//! absorbed by the reconciler and logged; they appear here so adapters and the
//! feed can report them.

use thiserror::Error;

use crate::config::ConfigError;
use crate::utils::DebouncerError;

/// Errors raised by the host note store.
#[derive(Error, Debug)]
pub enum HostError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The host answered with a non-success status.
    #[error("host error: {status} - {message}")]
    Status { status: u16, message: String },

    /// The requested note does not exist.
    #[error("note not found: {0}")]
    NotFound(String),

    /// The host cannot provide the requested capability.
    #[error("unsupported host operation: {0}")]
    Unsupported(&'static str),
}

/// Errors raised by the remote task service.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("remote error: {status} - {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session cookie cannot be sent as a header.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

/// Errors that can occur during bridge operations.
///
/// This is the primary error type for the crate.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Note store error.
    #[error("note store error: {0}")]
    Host(#[from] HostError),

    /// Remote task service error.
    #[error("task service error: {0}")]
    Remote(#[from] RemoteError),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The debounce worker has stopped.
    #[error("scheduler error: {0}")]
    Debounce(#[from] DebouncerError),
}

/// A specialized `Result` type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
