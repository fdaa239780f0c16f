//! Closed error taxonomy shared by every Engine-facing boundary.
//!
//! Adapters and Storage are free to use `anyhow::Result` internally; once an
//! error crosses into the Engine or an external surface it is folded into one
//! of these variants so CLI, HTTP, and MCP all see the same closed set.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable tag mirroring the `CkbError` variant, used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    IndexStale,
    BackendUnavailable,
    Timeout,
    Cancelled,
    Busy,
    PermissionDenied,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::IndexStale => "IndexStale",
            ErrorKind::BackendUnavailable => "BackendUnavailable",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Busy => "Busy",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::Internal => "Internal",
        }
    }
}

/// The closed error set surfaced by every Engine operation.
#[derive(Debug, Error)]
pub enum CkbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index is stale against HEAD: {0}")]
    IndexStale(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("busy: {0}")]
    Busy(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CkbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CkbError::NotFound(_) => ErrorKind::NotFound,
            CkbError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CkbError::IndexStale(_) => ErrorKind::IndexStale,
            CkbError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            CkbError::Timeout(_) => ErrorKind::Timeout,
            CkbError::Cancelled(_) => ErrorKind::Cancelled,
            CkbError::Busy(_) => ErrorKind::Busy,
            CkbError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            CkbError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Human message with no variant prefix, for wire responses.
    pub fn message(&self) -> String {
        match self {
            CkbError::NotFound(m)
            | CkbError::InvalidArgument(m)
            | CkbError::IndexStale(m)
            | CkbError::BackendUnavailable(m)
            | CkbError::Timeout(m)
            | CkbError::Cancelled(m)
            | CkbError::Busy(m)
            | CkbError::PermissionDenied(m)
            | CkbError::Internal(m) => m.clone(),
        }
    }
}

impl From<anyhow::Error> for CkbError {
    fn from(err: anyhow::Error) -> Self {
        CkbError::Internal(err.to_string())
    }
}

/// Wire-facing rendering of an error, embedded in a failed CompositeResult.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CkbError> for ErrorPayload {
    fn from(err: &CkbError) -> Self {
        ErrorPayload {
            kind: err.kind(),
            message: err.message(),
        }
    }
}

impl From<ErrorPayload> for CkbError {
    fn from(payload: ErrorPayload) -> Self {
        match payload.kind {
            ErrorKind::NotFound => CkbError::NotFound(payload.message),
            ErrorKind::InvalidArgument => CkbError::InvalidArgument(payload.message),
            ErrorKind::IndexStale => CkbError::IndexStale(payload.message),
            ErrorKind::BackendUnavailable => CkbError::BackendUnavailable(payload.message),
            ErrorKind::Timeout => CkbError::Timeout(payload.message),
            ErrorKind::Cancelled => CkbError::Cancelled(payload.message),
            ErrorKind::Busy => CkbError::Busy(payload.message),
            ErrorKind::PermissionDenied => CkbError::PermissionDenied(payload.message),
            ErrorKind::Internal => CkbError::Internal(payload.message),
        }
    }
}

pub type CkbResult<T> = Result<T, CkbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let err = CkbError::IndexStale("head moved".into());
        assert_eq!(err.kind(), ErrorKind::IndexStale);
        assert_eq!(err.kind().as_str(), "IndexStale");
    }

    #[test]
    fn anyhow_conversion_is_internal() {
        let err: CkbError = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn error_payload_round_trips_through_kind() {
        let original = CkbError::Busy("job queue full".to_string());
        let payload = ErrorPayload::from(&original);
        let restored: CkbError = payload.into();
        assert_eq!(restored.kind(), ErrorKind::Busy);
        assert_eq!(restored.message(), "job queue full");
    }
}
