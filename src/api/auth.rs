use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{error::Result, models::PublicUser};

use super::{ApiJson, AppState};

// ==================== REQUEST/RESPONSE TYPES ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub init_data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: PublicUser,
}

// ==================== HANDLERS ====================

/// POST /auth, POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let session = state.sessions.login(&req.init_data).await?;

    Ok(Json(LoginResponse {
        token: session.token,
        expires_in: session.expires_in,
        user: PublicUser::from(&session.user),
    }))
}
