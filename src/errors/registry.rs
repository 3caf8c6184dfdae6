//! HTTP surface error types
//!
//! Errors raised while talking to the NiFi Registry or a NiFi instance over
//! REST. Both surfaces share one transport, so they share one error type.
//!
//! # Examples
//!
//! ```rust
//! use flowsync::errors::RegistryError;
//!
//! let err = RegistryError::RequestFailed {
//!     status: 404,
//!     body: "bucket not found".to_string(),
//! };
//! assert!(err.is_client_error());
//! assert_eq!(err.status(), Some(404));
//! ```

use thiserror::Error;

/// Errors from a single REST call
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The remote service could not be reached (connect error, timeout)
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    /// The service answered with a non-2xx status
    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    /// The service answered 2xx but the body was not the expected JSON
    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    /// The client could not be constructed
    #[error("Invalid client configuration: {0}")]
    InvalidConfiguration(String),
}

impl RegistryError {
    pub fn malformed(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        RegistryError::MalformedResponse {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// HTTP status, when the service answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            RegistryError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this is a client error (400-series)
    pub fn is_client_error(&self) -> bool {
        matches!(self, RegistryError::RequestFailed { status, .. } if (400..500).contains(status))
    }

    /// Check if this is a not found error (404)
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Check if waiting and trying again could help
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Unavailable(_) => true,
            RegistryError::RequestFailed { status, .. } => *status == 409 || *status >= 500,
            _ => false,
        }
    }

    /// Get error code for logs and summaries
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::Unavailable(_) => "REGISTRY_UNAVAILABLE",
            RegistryError::RequestFailed { .. } => "REGISTRY_REQUEST_FAILED",
            RegistryError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            RegistryError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
        }
    }
}
