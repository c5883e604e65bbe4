//! Error types for relink-engine
//!
//! Automated layers return [`RepairError`]; their engine entry points log and
//! discard it. Manual pairing returns [`PairingError`], which the caller
//! surfaces as a structured response.

use thiserror::Error;

/// Failure inside an automated repair layer
#[derive(Error, Debug)]
pub enum RepairError {
    /// Store read or write failed
    #[error("Store error: {0}")]
    Store(#[from] relink_common::Error),
}

/// Rejected or failed manual pairing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    /// Missing capability or bad anti-replay token
    #[error("{0}")]
    Unauthorized(String),

    /// Malformed request (non-positive ids)
    #[error("{0}")]
    InvalidRequest(String),

    /// Subscription or order does not exist
    #[error("{0}")]
    NotFound(String),

    /// Record state violates a precondition
    #[error("{0}")]
    InvalidState(String),

    /// Unexpected failure while applying the pairing
    #[error("{0}")]
    Internal(String),
}

impl PairingError {
    /// HTTP-style status code for the pairing response
    pub fn status_code(&self) -> u16 {
        match self {
            PairingError::Unauthorized(_) => 403,
            PairingError::InvalidRequest(_) | PairingError::InvalidState(_) => 400,
            PairingError::NotFound(_) => 404,
            PairingError::Internal(_) => 500,
        }
    }
}

/// Convenience Result type for automated layers
pub type Result<T> = std::result::Result<T, RepairError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairing_status_codes() {
        assert_eq!(PairingError::NotFound("x".into()).status_code(), 404);
        assert_eq!(PairingError::InvalidState("x".into()).status_code(), 400);
        assert_eq!(PairingError::InvalidRequest("x".into()).status_code(), 400);
        assert_eq!(PairingError::Unauthorized("x".into()).status_code(), 403);
        assert_eq!(PairingError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_store_error_converts() {
        let err: RepairError = relink_common::Error::Internal("boom".into()).into();
        assert!(err.to_string().contains("boom"));
    }
}
