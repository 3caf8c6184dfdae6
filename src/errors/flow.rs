//! Flow export/import error types
//!
//! # Examples
//!
//! ```rust
//! use flowsync::errors::FlowError;
//!
//! let err = FlowError::AuthenticationFailed {
//!     retryable: false,
//!     reason: "bad password".to_string(),
//! };
//! assert!(err.is_fatal());
//! assert!(!err.is_retryable());
//! ```

use thiserror::Error;

use super::RegistryError;

/// Errors from exporting, importing and storing flow definitions
#[derive(Error, Debug)]
pub enum FlowError {
    /// A REST call failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The flow has no versions in the Registry
    #[error("No versions found for flow {0}")]
    NoVersionsFound(String),

    /// The flow document could not be parsed or is structurally invalid
    #[error("Invalid flow document: {0}")]
    InvalidFlowDocument(String),

    /// Token exchange failed
    #[error("Authentication failed ({}): {}", retry_label(.retryable), .reason)]
    AuthenticationFailed { retryable: bool, reason: String },

    /// The target process group could not be created
    #[error("Process group creation failed: {0}")]
    ProcessGroupCreationFailed(String),

    /// One component could not be created
    #[error("Failed to create {kind} '{name}': {reason}")]
    ComponentCreationFailed {
        kind: String,
        name: String,
        reason: String,
    },

    /// Reconstructed counts differ from the source document
    #[error("Verification mismatch for {kind}: expected {expected}, found {actual}")]
    VerificationMismatch {
        kind: String,
        expected: usize,
        actual: usize,
    },

    /// The flow store could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn retry_label(retryable: &bool) -> &'static str {
    if *retryable {
        "retryable"
    } else {
        "fatal"
    }
}

impl FlowError {
    /// Errors that abort a whole operation rather than a single item
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            FlowError::ComponentCreationFailed { .. } | FlowError::VerificationMismatch { .. }
        )
    }

    /// Check if the caller may poll and try again
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowError::AuthenticationFailed { retryable, .. } => *retryable,
            FlowError::Registry(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Get error code for logs and summaries
    pub fn error_code(&self) -> &'static str {
        match self {
            FlowError::Registry(err) => err.error_code(),
            FlowError::NoVersionsFound(_) => "NO_VERSIONS_FOUND",
            FlowError::InvalidFlowDocument(_) => "INVALID_FLOW_DOCUMENT",
            FlowError::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            FlowError::ProcessGroupCreationFailed(_) => "PROCESS_GROUP_CREATION_FAILED",
            FlowError::ComponentCreationFailed { .. } => "COMPONENT_CREATION_FAILED",
            FlowError::VerificationMismatch { .. } => "VERIFICATION_MISMATCH",
            FlowError::Io(_) => "IO_ERROR",
            FlowError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}
