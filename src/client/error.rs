//! Error types for Kibana and Fleet API operations.
//!
//! Callers that need to treat a specific outcome specially (a missing policy
//! during cleanup, a conflicting create, a convergence timeout) match on the
//! variant or use the `is_*` predicates, never on the message text.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Kind of remote resource an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Agent,
    AgentPolicy,
    PackagePolicy,
    Package,
    Output,
    FleetServerHost,
    SavedObject,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Agent => "agent",
            Self::AgentPolicy => "policy",
            Self::PackagePolicy => "package policy",
            Self::Package => "package",
            Self::Output => "fleet output",
            Self::FleetServerHost => "fleet server host",
            Self::SavedObject => "saved object",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum KibanaError {
    /// The remote resource does not exist (HTTP 404).
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: String },

    /// A create request collided with an existing resource (HTTP 409).
    #[error("could not create {kind} {name}: resource already exists")]
    Conflict { kind: ResourceKind, name: String },

    /// A license-gated or version-gated feature is unavailable.
    #[error("{feature} is not supported by this deployment")]
    NotSupported { feature: String },

    /// Any other unexpected response status.
    #[error("could not {operation}; API status code = {status}; path = {path}; response body = {body}")]
    Api {
        operation: String,
        path: String,
        status: u16,
        body: String,
    },

    /// The server refused the request and explained why (HTTP 400 `message`).
    #[error("could not {operation}: {message}")]
    Rejected { operation: String, message: String },

    /// The overall deadline of a convergence wait elapsed.
    #[error("timeout: {operation} did not converge within {elapsed:?}")]
    Timeout {
        operation: String,
        elapsed: Duration,
    },

    /// The caller cancelled the operation.
    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    /// The response body could not be decoded.
    #[error("could not decode {operation} response (body: {body}): {source}")]
    Decode {
        operation: String,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    /// Several independent items of a bulk operation failed.
    #[error("{operation} reported {} error(s): {}", .errors.len(), .errors.join("; "))]
    Aggregate {
        operation: String,
        errors: Vec<String>,
    },

    /// The request could not be sent or its body could not be read.
    #[error("could not send request to Kibana API ({path}): {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// Draining a paginated listing failed; partial results are discarded.
    #[error("could not list {path}: {source}")]
    Pagination {
        path: String,
        #[source]
        source: Box<KibanaError>,
    },

    /// The server version could not be determined or parsed.
    #[error("failed to get Kibana version: {0}")]
    Version(String),

    /// The request could not be built locally.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KibanaError>;

impl KibanaError {
    pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            name: name.into(),
        }
    }

    pub fn not_supported(feature: impl Into<String>) -> Self {
        Self::NotSupported {
            feature: feature.into(),
        }
    }

    pub fn api(
        operation: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        body: &[u8],
    ) -> Self {
        Self::Api {
            operation: operation.into(),
            path: path.into(),
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }

    pub fn decode(operation: impl Into<String>, body: &[u8], source: serde_json::Error) -> Self {
        Self::Decode {
            operation: operation.into(),
            body: String::from_utf8_lossy(body).into_owned(),
            source,
        }
    }

    /// Unwraps pagination wrappers to reach the error that caused them.
    pub fn root(&self) -> &KibanaError {
        match self {
            Self::Pagination { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), Self::Conflict { .. })
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self.root(), Self::NotSupported { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled { .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self.root() {
            Self::Api { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            Self::Conflict { .. } => Some(409),
            Self::Rejected { .. } => Some(400),
            _ => None,
        }
    }
}
