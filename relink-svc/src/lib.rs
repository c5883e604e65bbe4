//! relink-svc library - HTTP surface of the repair engine
//!
//! Hook endpoints for the order-processing system, manual pairing with
//! nonce issuance, and the orphan listing an admin UI consumes.

use axum::Router;
use relink_engine::sqlite::SqliteAuthorizer;
use relink_engine::RepairEngine;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Shared secret for request authentication; 0 disables it
    pub shared_secret: i64,
    pub engine: Arc<RepairEngine>,
    pub authorizer: Arc<SqliteAuthorizer>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        shared_secret: i64,
        engine: Arc<RepairEngine>,
        authorizer: Arc<SqliteAuthorizer>,
    ) -> Self {
        Self {
            db,
            shared_secret,
            engine,
            authorizer,
        }
    }
}

/// Build application router
///
/// Everything except `/health` goes through the auth middleware.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let protected = Router::new()
        .route("/hooks/before-write", post(api::before_write))
        .route("/hooks/subscription-created", post(api::subscription_created))
        .route("/hooks/order-status", post(api::order_status))
        .route("/hooks/event", post(api::event))
        .route("/api/pairing", post(api::pair))
        .route("/api/pairing/nonce", post(api::issue_nonce))
        .route("/api/orphans", get(api::list_orphans))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    Router::new()
        .merge(protected)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
