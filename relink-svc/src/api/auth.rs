//! Authentication middleware
//!
//! Every protected request carries `timestamp` (Unix ms) and `hash`. For
//! requests with a body both live in the JSON body and the hash covers the
//! whole body. For GET requests they are query parameters; the hash covers a
//! JSON object of all query parameters, string-valued except `timestamp`.

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use relink_common::api::{
    validate_hash, validate_timestamp, ApiAuthError, AuthErrorResponse, AuthRequest,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::AppState;

/// Body limit for hashed requests
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    // secret 0 disables auth
    if state.shared_secret == 0 {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();

    let (signed, body_bytes) = if parts.method == Method::GET {
        (query_object(&parts.uri)?, None)
    } else {
        let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| AuthError::ParseError(format!("Failed to read body: {}", e)))?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::ParseError(format!("Invalid JSON: {}", e)))?;
        (value, Some(bytes))
    };

    let fields: AuthRequest = serde_json::from_value(signed.clone())
        .map_err(|e| AuthError::MissingFields(e.to_string()))?;

    validate_timestamp(fields.timestamp).map_err(|e| match e {
        ApiAuthError::InvalidTimestamp { reason, .. } => AuthError::InvalidTimestamp(reason),
        other => AuthError::Other(other.to_string()),
    })?;

    validate_hash(&fields.hash, &signed, state.shared_secret).map_err(|e| match e {
        ApiAuthError::InvalidHash {
            provided,
            calculated,
        } => {
            warn!(
                path = %parts.uri.path(),
                "Hash validation failed: provided={}, calculated={}",
                provided, calculated
            );
            AuthError::InvalidHash
        }
        other => AuthError::Other(other.to_string()),
    })?;

    let body = match body_bytes {
        Some(bytes) => Body::from(bytes),
        None => Body::empty(),
    };
    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Query parameters as the JSON object the client signed
fn query_object(uri: &axum::http::Uri) -> Result<Value, AuthError> {
    let Query(params) = Query::<BTreeMap<String, String>>::try_from_uri(uri)
        .map_err(|e| AuthError::ParseError(format!("Invalid query string: {}", e)))?;

    let mut object = Map::new();
    for (key, value) in params {
        let value = if key == "timestamp" {
            value
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| AuthError::MissingFields("timestamp must be an integer".to_string()))?
        } else {
            Value::String(value)
        };
        object.insert(key, value);
    }
    Ok(Value::Object(object))
}

#[derive(Debug)]
pub enum AuthError {
    InvalidTimestamp(String),
    InvalidHash,
    MissingFields(String),
    ParseError(String),
    Other(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthError::InvalidTimestamp(reason) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TIMESTAMP",
                format!("Invalid timestamp: {}", reason),
            ),
            AuthError::InvalidHash => (
                StatusCode::UNAUTHORIZED,
                "INVALID_HASH",
                "Invalid hash".to_string(),
            ),
            AuthError::MissingFields(msg) => (
                StatusCode::BAD_REQUEST,
                "MISSING_AUTH_FIELDS",
                format!("Missing required fields: {}", msg),
            ),
            AuthError::ParseError(msg) => (
                StatusCode::BAD_REQUEST,
                "PARSE_ERROR",
                format!("Parse error: {}", msg),
            ),
            AuthError::Other(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_ERROR",
                format!("Authentication error: {}", msg),
            ),
        };

        (status, Json(AuthErrorResponse::new(code, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_object_types_timestamp() {
        let uri: axum::http::Uri = "/api/orphans?limit=5&timestamp=1700000000000&hash=abc"
            .parse()
            .unwrap();

        let object = query_object(&uri).unwrap();

        assert_eq!(object["timestamp"], 1_700_000_000_000i64);
        assert_eq!(object["limit"], "5");
        assert_eq!(object["hash"], "abc");
    }

    #[test]
    fn test_query_object_rejects_bad_timestamp() {
        let uri: axum::http::Uri = "/api/orphans?timestamp=soon".parse().unwrap();
        assert!(matches!(query_object(&uri), Err(AuthError::MissingFields(_))));
    }
}
