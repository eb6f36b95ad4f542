//! Fault types raised by the dispatch core and the status coarsening rule.

use crate::status::StatusCode;

/// A bad status surfaced as an error.
///
/// Connection loss always maps to the dedicated [`BadStatus::Disconnect`]
/// variant so callers can match on it without comparing raw codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BadStatus {
    /// The session was lost (`BadDisconnect`).
    #[error("BadDisconnect")]
    Disconnect,
    /// Any other bad status.
    #[error("{0}")]
    Status(StatusCode),
}

impl BadStatus {
    /// Builds the error for `code`, selecting the disconnect variant when it applies.
    #[must_use]
    pub fn new(code: StatusCode) -> Self {
        if code == StatusCode::BAD_DISCONNECT {
            Self::Disconnect
        } else {
            Self::Status(code)
        }
    }

    /// The underlying status code.
    #[must_use]
    pub fn code(&self) -> StatusCode {
        match self {
            Self::Disconnect => StatusCode::BAD_DISCONNECT,
            Self::Status(code) => *code,
        }
    }

    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnect)
    }
}

impl From<BadStatus> for StatusCode {
    fn from(err: BadStatus) -> Self {
        err.code()
    }
}

/// Faults produced by the core itself rather than by the engine or user code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("connection is closed")]
    Closed,
}

impl DispatchError {
    /// Status code reported to asynchronous handlers for this fault.
    #[must_use]
    pub fn code(&self) -> StatusCode {
        match self {
            Self::Timeout { .. } => StatusCode::BAD_TIMEOUT,
            Self::Closed => StatusCode::BAD_CONNECTION_CLOSED,
        }
    }
}

/// Coarsens an arbitrary fault into a status code.
///
/// Faults that carry an explicit status anywhere in their cause chain keep it;
/// everything else becomes `BadInternalError`.
#[must_use]
pub fn status_of(err: &anyhow::Error) -> StatusCode {
    for cause in err.chain() {
        if let Some(bad) = cause.downcast_ref::<BadStatus>() {
            return bad.code();
        }
        if let Some(dispatch) = cause.downcast_ref::<DispatchError>() {
            return dispatch.code();
        }
    }
    StatusCode::BAD_INTERNAL_ERROR
}
