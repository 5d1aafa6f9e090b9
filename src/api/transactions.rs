use axum::{extract::State, http::HeaderMap, Json};

use crate::{error::Result, models::Transaction};

use super::{require_user, AppState};

/// GET /api/user/transactions, GET /api/transactions
pub async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Transaction>>> {
    let telegram_id = require_user(&headers, &state)?;
    let transactions = state.ledger.transactions(&telegram_id).await?;
    Ok(Json(transactions))
}
