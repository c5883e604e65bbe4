//! API authentication via timestamp and hash validation
//!
//! - Every protected request includes `timestamp` (i64 Unix epoch ms) and
//!   `hash` (SHA-256, 64 hex chars)
//! - Timestamp must fall inside a short window around server time
//! - Hash is calculated from canonical JSON + shared secret
//! - Shared secret is stored in the `settings` table; the value 0 disables
//!   checking
//!
//! Anti-replay nonces for the pairing operation are generated here too; their
//! persistence and single-use consumption live with the pairing authorizer.

use serde_json::Value;
use sha2::{Digest, Sha256};

#[cfg(feature = "sqlx")]
use sqlx::SqlitePool;

/// Maximum age of a request timestamp
pub const MAX_PAST_MS: i64 = 5_000;

/// Maximum clock skew tolerated for timestamps from the future
pub const MAX_FUTURE_MS: i64 = 1_000;

const DUMMY_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// ========================================
// Error Types
// ========================================

/// Authentication error types
#[derive(Debug, Clone)]
pub enum ApiAuthError {
    /// Timestamp outside acceptable window
    InvalidTimestamp {
        timestamp: i64,
        now: i64,
        reason: String,
    },

    /// Hash does not match calculated value
    InvalidHash { provided: String, calculated: String },

    /// Database error loading shared secret
    DatabaseError(String),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::InvalidTimestamp { reason, .. } => {
                write!(f, "Invalid timestamp: {}", reason)
            }
            ApiAuthError::InvalidHash { .. } => write!(f, "Invalid hash"),
            ApiAuthError::DatabaseError(err) => write!(f, "Database error: {}", err),
        }
    }
}

impl std::error::Error for ApiAuthError {}

// ========================================
// Shared Secret Management
// ========================================

/// Load shared secret from database settings, creating one if absent
///
/// Key `api_shared_secret`, value i64. The special value 0 disables auth.
#[cfg(feature = "sqlx")]
pub async fn load_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = 'api_shared_secret'")
            .fetch_optional(db)
            .await
            .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match result {
        Some((value,)) => value
            .parse::<i64>()
            .map_err(|e| ApiAuthError::DatabaseError(format!("Invalid i64: {}", e))),
        None => initialize_shared_secret(db).await,
    }
}

/// Generate and store a random non-zero shared secret
#[cfg(feature = "sqlx")]
pub async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let secret: i64 = loop {
        let val = rng.gen::<i64>();
        if val != 0 {
            break val;
        }
    };

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES ('api_shared_secret', ?)")
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    Ok(secret)
}

// ========================================
// Timestamp Validation
// ========================================

/// Validate a request timestamp against the current server time
///
/// ```
/// use relink_common::api::auth::validate_timestamp;
///
/// let now = relink_common::time::now_millis();
/// assert!(validate_timestamp(now - 500).is_ok());
/// assert!(validate_timestamp(now - 60_000).is_err());
/// ```
pub fn validate_timestamp(timestamp: i64) -> Result<(), ApiAuthError> {
    validate_timestamp_at(timestamp, crate::time::now_millis())
}

/// Validate a timestamp against an explicit `now` (milliseconds)
pub fn validate_timestamp_at(timestamp: i64, now: i64) -> Result<(), ApiAuthError> {
    let diff = now - timestamp;

    if diff > MAX_PAST_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!("Timestamp {}ms too old (max {}ms past)", diff, MAX_PAST_MS),
        });
    }

    if diff < -MAX_FUTURE_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!(
                "Timestamp {}ms in future (max {}ms future)",
                diff.abs(),
                MAX_FUTURE_MS
            ),
        });
    }

    Ok(())
}

// ========================================
// Hash Calculation and Validation
// ========================================

/// Calculate the request hash
///
/// 1. Replace hash field with dummy hash (64 zeros)
/// 2. Convert to canonical JSON (sorted keys, no whitespace)
/// 3. Append shared secret as decimal i64 string
/// 4. SHA-256, rendered as 64 hex characters
///
/// ```
/// use relink_common::api::auth::calculate_hash;
/// use serde_json::json;
///
/// let body = json!({"subscription_id": 901, "order_id": 500, "timestamp": 1730000000000i64});
/// assert_eq!(calculate_hash(&body, 123456789).len(), 64);
/// ```
pub fn calculate_hash(json_value: &Value, shared_secret: i64) -> String {
    let mut value = json_value.clone();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(DUMMY_HASH.to_string()));
    }

    let canonical = to_canonical_json(&value);
    let to_hash = format!("{}{}", canonical, shared_secret);

    let mut hasher = Sha256::new();
    hasher.update(to_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Convert JSON to canonical form (sorted keys, no whitespace)
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("\"{}\":{}", k, to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

/// Validate hash matches calculated value
pub fn validate_hash(
    provided_hash: &str,
    json_value: &Value,
    shared_secret: i64,
) -> Result<(), ApiAuthError> {
    let calculated = calculate_hash(json_value, shared_secret);

    if provided_hash != calculated {
        return Err(ApiAuthError::InvalidHash {
            provided: provided_hash.to_string(),
            calculated,
        });
    }

    Ok(())
}

// ========================================
// Nonces
// ========================================

/// Generate an unguessable single-use token
pub fn generate_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_inside_window_accepted() {
        let now = 1_730_000_000_000;
        assert!(validate_timestamp_at(now, now).is_ok());
        assert!(validate_timestamp_at(now - MAX_PAST_MS, now).is_ok());
        assert!(validate_timestamp_at(now + MAX_FUTURE_MS, now).is_ok());
    }

    #[test]
    fn test_timestamp_too_old_rejected() {
        let now = 1_730_000_000_000;
        assert!(validate_timestamp_at(now - MAX_PAST_MS - 1, now).is_err());
    }

    #[test]
    fn test_timestamp_future_rejected() {
        let now = 1_730_000_000_000;
        let err = validate_timestamp_at(now + MAX_FUTURE_MS + 1, now).unwrap_err();
        assert!(err.to_string().contains("in future"));
    }

    #[test]
    fn test_hash_is_stable_and_secret_dependent() {
        let json = serde_json::json!({
            "subscription_id": 901,
            "order_id": 500,
            "timestamp": 1730000000000i64,
            "hash": DUMMY_HASH
        });

        let hash = calculate_hash(&json, 123456789);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, calculate_hash(&json, 123456789));
        assert_ne!(hash, calculate_hash(&json, 987654321));
    }

    #[test]
    fn test_hash_ignores_provided_hash_value() {
        let a = serde_json::json!({"order_id": 1, "hash": "anything"});
        let b = serde_json::json!({"order_id": 1, "hash": "something-else"});
        assert_eq!(calculate_hash(&a, 42), calculate_hash(&b, 42));
    }

    #[test]
    fn test_canonical_json_sorted_without_whitespace() {
        let json = serde_json::json!({"z": 3, "a": [1, 2], "m": {"y": true, "b": null}});
        assert_eq!(
            to_canonical_json(&json),
            r#"{"a":[1,2],"m":{"b":null,"y":true},"z":3}"#
        );
    }

    #[test]
    fn test_validate_hash_round_trip() {
        let json = serde_json::json!({"order_id": 500, "hash": "x"});
        let calculated = calculate_hash(&json, 7);
        assert!(validate_hash(&calculated, &json, 7).is_ok());
        assert!(matches!(
            validate_hash(DUMMY_HASH, &json, 7),
            Err(ApiAuthError::InvalidHash { .. })
        ));
    }

    #[test]
    fn test_nonces_are_unique() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
