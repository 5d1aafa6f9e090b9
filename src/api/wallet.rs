use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};

use crate::{error::Result, models::Deposit};

use super::{require_user, whole_number, ApiJson, AppState};

// ==================== REQUEST/RESPONSE TYPES ====================

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub amount: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

// ==================== HANDLERS ====================

/// POST /api/user/deposit
pub async fn deposit(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<TransferRequest>,
) -> Result<Json<BalanceResponse>> {
    let telegram_id = require_user(&headers, &state)?;
    let user = state
        .ledger
        .deposit(&telegram_id, whole_number(req.amount.as_ref()))
        .await?;
    Ok(Json(BalanceResponse {
        balance: user.balance,
    }))
}

/// POST /api/user/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<TransferRequest>,
) -> Result<Json<BalanceResponse>> {
    let telegram_id = require_user(&headers, &state)?;
    let user = state
        .ledger
        .withdraw(&telegram_id, whole_number(req.amount.as_ref()))
        .await?;
    Ok(Json(BalanceResponse {
        balance: user.balance,
    }))
}

/// GET /api/user/deposits
pub async fn list_deposits(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Deposit>>> {
    let telegram_id = require_user(&headers, &state)?;
    Ok(Json(state.ledger.deposits(&telegram_id).await?))
}
