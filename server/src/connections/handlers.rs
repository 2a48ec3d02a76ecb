use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::connections::ConnectionRecord;
use crate::error::Error;
use crate::state::AppState;
use crate::users::UserRecord;

// --- Request/Response types ---

#[derive(Debug, Deserialize)]
pub struct FingerprintQuery {
    pub fingerprint: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelfResponse {
    pub connection: Option<ConnectionRecord>,
    pub user: Option<UserRecord>,
}

// --- Handlers ---

/// POST /connections/new/?fingerprint=...
/// Registers a new connection or refreshes an existing one. Responds with JSON `null`.
pub async fn new_connection(
    State(state): State<AppState>,
    Query(query): Query<FingerprintQuery>,
) -> Json<serde_json::Value> {
    state.connections.touch(&query.fingerprint);
    Json(serde_json::Value::Null)
}

/// GET /connections/self/?fingerprint=...
/// Returns the caller's connection and bound user, clearing the record's
/// `update` flag. 404 with both fields null when the fingerprint is unknown.
pub async fn get_self(
    State(state): State<AppState>,
    Query(query): Query<FingerprintQuery>,
) -> Result<(StatusCode, Json<SelfResponse>), Error> {
    let response = match state
        .connections
        .lookup_self(&query.fingerprint, &state.users)?
    {
        Some(found) => (
            StatusCode::OK,
            Json(SelfResponse {
                connection: Some(found.connection),
                user: found.user,
            }),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(SelfResponse {
                connection: None,
                user: None,
            }),
        ),
    };
    Ok(response)
}
