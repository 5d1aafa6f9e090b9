// src/api/mod.rs

pub mod auth;
pub mod game;
pub mod health;
pub mod profile;
pub mod transactions;
pub mod wallet;

use axum::extract::FromRequest;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::services::{Dealer, GameService, LedgerService, NotificationService, SessionService};
use crate::utils::Clock;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub sessions: Arc<SessionService>,
    pub ledger: Arc<LedgerService>,
    pub games: Arc<GameService>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        dealer: Arc<dyn Dealer>,
    ) -> Result<Self> {
        let notifier = NotificationService::new(&config)?;
        if notifier.is_enabled() {
            tracing::info!("Telegram win notifications enabled");
        }
        Ok(Self {
            sessions: Arc::new(SessionService::new(store.clone(), clock.clone(), &config)),
            ledger: Arc::new(LedgerService::new(store.clone(), clock.clone(), &config)),
            games: Arc::new(GameService::new(store.clone(), clock, dealer, notifier)),
            store,
            config,
        })
    }
}

/// `Json` whose rejections answer in the `AppError` envelope instead of
/// axum's plain-text 422.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Integral JSON numbers only; fractions, strings and absent fields are `None`.
pub fn whole_number(value: Option<&serde_json::Value>) -> Option<i64> {
    value.and_then(serde_json::Value::as_i64)
}

/// Resolve the bearer session on a protected request to a telegram user id.
pub fn require_user(headers: &HeaderMap, state: &AppState) -> Result<String> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or(AppError::Unauthenticated)?;
    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::InvalidSession)?
        .trim();
    if auth_str.is_empty() {
        return Err(AppError::Unauthenticated);
    }
    let token = match auth_str.strip_prefix("Bearer") {
        Some(rest) if rest.is_empty() || rest.starts_with(' ') => rest.trim(),
        _ => return Err(AppError::InvalidSession),
    };
    if token.is_empty() {
        return Err(AppError::Unauthenticated);
    }

    state.sessions.authenticate(token)
}
