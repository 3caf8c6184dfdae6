//! Domain-specific error types for flowsync
//!
//! # Error Categories
//!
//! - **RegistryError**: REST transport errors against the Registry and NiFi
//! - **FlowError**: Export, import and flow store errors
//!
//! Item-level failures (one flow during export, one component during import)
//! are represented by [`FlowError`] values that callers log and count rather
//! than propagate; see [`FlowError::is_fatal`].

pub mod flow;
pub mod registry;

pub use flow::FlowError;
pub use registry::RegistryError;

/// Result type alias for REST calls
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type alias for flow operations
pub type FlowResult<T> = Result<T, FlowError>;
