//! Shared HTTP API functionality
//!
//! Request authentication primitives and shared types. Contains only pure
//! functions and database operations (via sqlx); the service wraps these in
//! framework-specific middleware.

pub mod auth;
pub mod types;

#[cfg(feature = "sqlx")]
pub use auth::{initialize_shared_secret, load_shared_secret};
pub use auth::{calculate_hash, generate_nonce, validate_hash, validate_timestamp, ApiAuthError};
pub use types::{AuthErrorResponse, AuthRequest};
