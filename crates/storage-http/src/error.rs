//! Error types for HTTP collaborators.

use blob_artifacts::ServiceError;
use thiserror::Error;

/// Errors specific to the HTTP engine and metadata-service client.
#[derive(Error, Debug)]
pub enum HttpError {
    /// The request did not produce a response.
    #[error("HTTP request error: {message}")]
    Request { message: String, retryable: bool },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// A response header or body was missing or malformed.
    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        let retryable: bool = err.is_timeout() || err.is_connect();
        // Signed URLs carry credentials in the query
        HttpError::Request {
            retryable,
            message: err.without_url().to_string(),
        }
    }
}

impl From<HttpError> for ServiceError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Request { message, retryable } => {
                ServiceError::Network { message, retryable }
            }
            HttpError::Status { status, url, body } => ServiceError::Http {
                status,
                message: format!("{}: {}", url, body),
            },
            HttpError::InvalidResponse { url, message } => ServiceError::InvalidResponse {
                message: format!("{}: {}", url, message),
            },
            HttpError::ConfigError(message) => ServiceError::InvalidRequest { message },
            HttpError::IoError(e) => ServiceError::Io {
                path: String::new(),
                message: e.to_string(),
            },
        }
    }
}
