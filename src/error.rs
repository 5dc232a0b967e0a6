//! Error types and transport error mapping

use std::path::PathBuf;

use thiserror::Error;

/// Result type for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for session-managed transfers
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid header name or value
    #[error("Invalid header")]
    InvalidHeader,

    /// Request could not be constructed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Network error from the transport
    #[error("Network error: {message} (code: {code})")]
    Network {
        /// Transport-specific error code
        code: i64,
        /// Error message
        message: String,
    },

    /// TLS/Certificate error
    #[error("TLS error: {message}")]
    Tls {
        /// Error message
        message: String,
    },

    /// Timeout error
    #[error("Request timed out")]
    Timeout,

    /// Request was cancelled
    #[error("Request was cancelled")]
    Cancelled,

    /// The task finished without an error and without any response metadata
    #[error("No response received")]
    NoResponse,

    /// The response carried a status outside the 2xx range
    #[error("HTTP {code}: {description}")]
    Status {
        /// Numeric HTTP status
        code: u16,
        /// Human-readable description of the status
        description: String,
    },

    /// A downloaded resource could not be moved to its destination
    #[error("Failed to move downloaded file from {from:?} to {to:?}: {source}")]
    Relocation {
        /// Temporary location provided by the transport
        from: PathBuf,
        /// Requested destination
        to: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The transport session carrying the task became invalid
    #[error("Session was invalidated")]
    SessionInvalidated,

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// UTF-8 conversion error
    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error reports a cancelled task
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// The HTTP status carried by a [`Error::Status`] error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Build a status error for a non-success response
    pub(crate) fn from_status(status: http::StatusCode) -> Self {
        Error::Status {
            code: status.as_u16(),
            description: crate::status::describe_status(status),
        }
    }

    /// Convert a reqwest error to our Error type
    #[cfg(feature = "backend-reqwest")]
    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Error::Timeout;
        }

        let message = error.to_string();
        if error.is_builder() {
            return Error::InvalidRequest(message);
        }

        // rustls surfaces certificate problems through the connect error chain
        let mut source = std::error::Error::source(&error);
        while let Some(cause) = source {
            let text = cause.to_string();
            if text.contains("certificate") || text.contains("tls") {
                return Error::Tls { message: text };
            }
            source = cause.source();
        }

        Error::Network {
            code: if error.is_connect() { -1004 } else { -1 },
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_carries_code_and_description() {
        let error = Error::from_status(http::StatusCode::NOT_FOUND);
        assert_eq!(error.status_code(), Some(404));
        assert_eq!(error.to_string(), "HTTP 404: Not Found (client error)");
    }

    #[test]
    fn test_cancelled_detection() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::NoResponse.is_cancelled());
        assert_eq!(Error::Timeout.status_code(), None);
    }
}
