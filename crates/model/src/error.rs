//! The two-layer error split: `StoreError` is what the persistence layer
//! raises; `OrchestratorError` is what the hard core surfaces to callers.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Low-level storage failure.
#[derive(Debug)]
pub enum StoreError {
    NotFound,
    Conflict,
    Other(Box<dyn StdError + Send + Sync>),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "row not found"),
            Self::Conflict => write!(f, "conflicting concurrent write"),
            Self::Other(why) => write!(f, "{why}"),
        }
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Other(why) => Some(why.as_ref()),
            _ => None,
        }
    }
}

impl StoreError {
    pub fn other<E: StdError + Send + Sync + 'static>(why: E) -> Self {
        Self::Other(Box::new(why))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Domain errors raised by the orchestrator. Each variant maps to exactly
/// one wire status code at the gateway: `INVALID_INPUT` or `NOT_FOUND`.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("malformed or missing field: {0}")]
    InvalidPayload(String),

    #[error("session token unknown or expired")]
    AuthRequired,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("operation is not valid from the current state: {0}")]
    InvalidState(&'static str),

    #[error("candidate assignment is no longer pending")]
    StaleAssignment,

    #[error("rider already has a non-terminal ride request")]
    RequestInFlight,

    #[error("no drivers are available for this request")]
    NoDriversAvailable,

    #[error("map service unavailable: {0}")]
    MapUnavailable(String),

    #[error("candidate selection failed: {0}")]
    SelectorFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The three wire status codes the gateway can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireStatus {
    Ok = 1,
    InvalidInput = 2,
    NotFound = 3,
}

impl OrchestratorError {
    pub fn wire_status(&self) -> WireStatus {
        match self {
            Self::NotFound(_) | Self::NoDriversAvailable => WireStatus::NotFound,
            _ => WireStatus::InvalidInput,
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
