//! Error types shared across the fetch, parse and aggregation layers.
//!
//! Application entry points use `anyhow`; these typed errors exist where a
//! caller has to branch on *what* went wrong (not-found vs. transport failure,
//! missing vs. mistyped field, fatal vs. absorbed).

use thiserror::Error;

/// Failure of a single read against the API server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The resource does not exist (HTTP 404).
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// The server answered with a non-success status other than 404.
    #[error("request for {resource} failed with status {status}")]
    Status { resource: String, status: u16 },

    /// The request never produced a response.
    #[error("request for {resource} failed: {message}")]
    Transport { resource: String, message: String },

    /// The response body was not well-formed JSON.
    #[error("failed to decode {resource}: {message}")]
    Decode { resource: String, message: String },

    /// The pass was cancelled before this request was dispatched.
    #[error("request for {resource} cancelled")]
    Cancelled { resource: String },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }
}

/// Failure to turn an already-fetched object into a typed entity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("required field `{0}` is missing")]
    MissingField(String),

    #[error("field `{field}` is not a {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },
}

impl ParseError {
    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ParseError::MissingField(field) => field,
            ParseError::TypeMismatch { field, .. } => field,
        }
    }
}

/// Errors that abort a whole aggregation pass.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// The top-level entity listing could not be retrieved.
    #[error("failed to list virtual machines: {0}")]
    Discovery(#[source] FetchError),

    /// The entity listing was retrieved but is not a list.
    #[error("virtual machine listing is malformed: {0}")]
    MalformedListing(#[source] ParseError),

    /// The storage-layer node listing could not be retrieved.
    #[error("failed to list storage nodes: {0}")]
    NodeListing(#[source] FetchError),

    /// The caller cancelled the pass.
    #[error("aggregation cancelled")]
    Cancelled,
}
