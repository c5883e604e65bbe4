//! HTTP API handlers for relink-svc

pub mod auth;
pub mod health;
pub mod hooks;
pub mod orphans;
pub mod pairing;

pub use auth::auth_middleware;
pub use health::health_routes;
pub use hooks::{before_write, event, order_status, subscription_created};
pub use orphans::list_orphans;
pub use pairing::{issue_nonce, pair};
