//! Manual pairing endpoints

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use relink_engine::{PairingError, PairingRequest, PairingResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::AppState;

/// Pairing body; auth fields are checked by the middleware
///
/// `user_id` is taken as stated by the caller. The capability and nonce
/// checks bind to that claimed identity, not to a session, so the signed
/// request hash is the only thing vouching for the caller. With
/// `shared_secret = 0` any client can act as any user.
#[derive(Debug, Deserialize)]
struct PairBody {
    subscription_id: i64,
    order_id: i64,
    user_id: i64,
    nonce: String,
}

/// POST /api/pairing
///
/// The HTTP status mirrors the `code` in the response body.
pub async fn pair(State(state): State<AppState>, Json(body): Json<Value>) -> impl IntoResponse {
    let result = match serde_json::from_value::<PairBody>(body) {
        Ok(body) => {
            let request = PairingRequest {
                subscription_id: body.subscription_id,
                order_id: body.order_id,
            };
            state.engine.pair(body.user_id, &body.nonce, request).await
        }
        Err(e) => Err(PairingError::InvalidRequest(format!(
            "Invalid pairing request: {}",
            e
        ))),
    };

    let response = PairingResponse::from(result);
    let status = StatusCode::from_u16(response.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response))
}

#[derive(Debug, Deserialize)]
pub struct NonceRequest {
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct NonceResponse {
    pub nonce: String,
}

/// POST /api/pairing/nonce
///
/// Issues a nonce for the claimed `user_id` if that user holds the manage
/// capability. There is no session behind the claim; see `PairBody`.
pub async fn issue_nonce(
    State(state): State<AppState>,
    Json(request): Json<NonceRequest>,
) -> Result<Json<NonceResponse>, (StatusCode, Json<Value>)> {
    match state.authorizer.issue_nonce(request.user_id).await {
        Ok(nonce) => Ok(Json(NonceResponse { nonce })),
        Err(relink_common::Error::InvalidInput(message)) => {
            warn!(user_id = request.user_id, "Nonce refused: {}", message);
            Err((
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": message })),
            ))
        }
        Err(e) => {
            error!(user_id = request.user_id, error = %e, "Failed to issue pairing nonce");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to issue nonce" })),
            ))
        }
    }
}
