use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    models::Winner,
    services::games::{Game, Outcome, Settlement, Symbol},
};

use super::{require_user, whole_number, ApiJson, AppState};

// ==================== REQUEST/RESPONSE TYPES ====================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub game: Game,
    pub name: &'static str,
    pub min_bet: i64,
}

#[derive(Debug, Deserialize)]
pub struct SpinRequest {
    pub bet: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinResponse {
    pub reels: [Symbol; 3],
    pub win_amount: i64,
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub game: Game,
    pub bet: Option<serde_json::Value>,
}

fn parse_bet(bet: Option<&serde_json::Value>) -> Result<i64> {
    whole_number(bet)
        .ok_or_else(|| AppError::InvalidBet("Bet must be a positive whole number".to_string()))
}

// ==================== HANDLERS ====================

/// GET /api/game/list
pub async fn list_games() -> Json<Vec<GameInfo>> {
    Json(
        Game::ALL
            .iter()
            .map(|game| GameInfo {
                game: *game,
                name: game.display_name(),
                min_bet: game.min_bet(),
            })
            .collect(),
    )
}

/// POST /api/game/spin
pub async fn spin(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<SpinRequest>,
) -> Result<Json<SpinResponse>> {
    let telegram_id = require_user(&headers, &state)?;
    let bet = parse_bet(req.bet.as_ref())?;
    let settlement = state.games.play(&telegram_id, Game::Slots, bet).await?;

    let Outcome::Slots { reels } = settlement.outcome else {
        return Err(AppError::Internal("slots settled without reels".to_string()));
    };

    Ok(Json(SpinResponse {
        reels,
        win_amount: settlement.win_amount,
        balance: settlement.balance,
    }))
}

/// POST /api/game/play
pub async fn play(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<PlayRequest>,
) -> Result<Json<Settlement>> {
    let telegram_id = require_user(&headers, &state)?;
    let bet = parse_bet(req.bet.as_ref())?;
    let settlement = state.games.play(&telegram_id, req.game, bet).await?;
    Ok(Json(settlement))
}

/// GET /api/game/recent-winners
pub async fn recent_winners(State(state): State<AppState>) -> Result<Json<Vec<Winner>>> {
    let winners = state
        .games
        .recent_winners(state.config.recent_winners_limit)
        .await?;
    Ok(Json(winners))
}
