/// Error types for the RPC layer and the file system interfaces.
///
/// Transport and protocol failures are kept apart from application errors:
/// [`RmiError`] is produced by the RPC layer itself, [`FsError`] is what the
/// file system interfaces declare. An `RmiError` can always be carried inside
/// an `FsError`, so callers of a remote interface see a single error type.

use serde::{Deserialize, Serialize};

/// RPC-layer failure: anything that prevented a call from completing
/// normally, as opposed to an error raised by the remote implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum RmiError {
    #[error("cannot resolve address {0}")]
    Unresolved(String),
    #[error("connection to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("no method {method}({params}) on interface {interface}")]
    NoSuchMethod {
        interface: String,
        method: String,
        params: String,
    },
    #[error("remote invocation failed: {0}")]
    Remote(String),
    #[error("cannot bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
    #[error("skeleton already started")]
    AlreadyStarted,
    #[error("skeleton is not listening")]
    NotListening,
}

impl RmiError {
    /// Whether the failure happened before or while talking to the peer,
    /// i.e. the remote side may never have seen the call.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Unresolved(_) | Self::Connect { .. } | Self::Network(_) | Self::Protocol(_)
        )
    }
}

impl From<bincode::Error> for RmiError {
    fn from(e: bincode::Error) -> Self {
        RmiError::Codec(e.to_string())
    }
}

/// Errors declared by the file system interfaces (Service, Registration,
/// Storage, Command).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("index out of range: {0}")]
    IndexOutOfRange(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error(transparent)]
    Rmi(#[from] RmiError),
}

impl FsError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        FsError::NotFound(what.to_string())
    }

    pub fn invalid(what: impl std::fmt::Display) -> Self {
        FsError::InvalidArgument(what.to_string())
    }

    pub fn illegal_state(what: impl std::fmt::Display) -> Self {
        FsError::IllegalState(what.to_string())
    }
}

/// Result type alias for file system operations.
pub type FsResult<T> = Result<T, FsError>;

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound(e.to_string()),
            _ => FsError::Io(e.to_string()),
        }
    }
}
