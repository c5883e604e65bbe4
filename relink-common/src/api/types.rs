//! Shared API request/response types

use serde::{Deserialize, Serialize};

/// Authentication-only request body
///
/// Every protected request carries these two fields alongside its payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthRequest {
    /// Unix epoch time in milliseconds
    pub timestamp: i64,

    /// SHA-256 hash (64 hex chars)
    pub hash: String,
}

/// Error body returned as 401 Unauthorized when authentication fails
#[derive(Debug, Clone, Serialize)]
pub struct AuthErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
}

impl AuthErrorResponse {
    /// Create new auth error response
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_request_deserialization() {
        let json = r#"{"timestamp": 1730000000000, "hash": "abc123", "order_id": 5}"#;
        let request: AuthRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.timestamp, 1730000000000);
        assert_eq!(request.hash, "abc123");
    }

    #[test]
    fn test_auth_error_response_serialization() {
        let error = AuthErrorResponse::new("INVALID_TIMESTAMP", "Timestamp too old");

        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["error"], "INVALID_TIMESTAMP");
        assert_eq!(json["message"], "Timestamp too old");
    }
}
