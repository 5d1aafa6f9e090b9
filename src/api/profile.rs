use axum::{extract::State, http::HeaderMap, Json};

use crate::{error::Result, services::ledger::Profile};

use super::{require_user, AppState};

/// GET /api/user/profile
pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Profile>> {
    let telegram_id = require_user(&headers, &state)?;
    let profile = state.ledger.profile(&telegram_id).await?;
    Ok(Json(profile))
}
