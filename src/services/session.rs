use chrono::Duration;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    config::Config,
    crypto::InitDataVerifier,
    db::Store,
    error::{AppError, Result},
    models::{NewUser, User},
    utils::Clock,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // telegram user id
    pub exp: i64,    // expiry
    pub iat: i64,    // issued at
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_in: i64,
    pub user: User,
}

/// Turns verified Telegram launches into stateless JWT sessions and back.
pub struct SessionService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    verifier: InitDataVerifier,
    jwt_secret: String,
    ttl_secs: i64,
    starting_balance: i64,
}

impl SessionService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            store,
            clock,
            verifier: InitDataVerifier::new(
                &config.telegram_bot_token,
                config.init_data_max_age_secs,
            ),
            jwt_secret: config.jwt_secret.clone(),
            ttl_secs: config.session_ttl_secs,
            starting_balance: config.starting_balance,
        }
    }

    /// Verify `initData`, find or create the user, and mint a session token.
    ///
    /// Nothing is written unless the signature checks out.
    pub async fn login(&self, init_data: &str) -> Result<IssuedSession> {
        let now = self.clock.now();
        let telegram_user = self.verifier.verify(init_data, now)?;

        let (user, created) = self
            .store
            .find_or_create_user(
                &NewUser {
                    telegram_id: telegram_user.id.clone(),
                    username: telegram_user.username.clone(),
                    starting_balance: self.starting_balance,
                },
                now,
            )
            .await?;

        if created {
            tracing::info!(
                "Created account for telegram user {} with balance {}",
                user.telegram_id,
                user.balance
            );
        }

        let token = self.issue(&user.telegram_id)?;

        Ok(IssuedSession {
            token,
            expires_in: self.ttl_secs,
            user,
        })
    }

    pub fn issue(&self, telegram_id: &str) -> Result<String> {
        let now = self.clock.now();
        let expiration = now
            .checked_add_signed(Duration::seconds(self.ttl_secs))
            .ok_or_else(|| AppError::Internal("session expiry overflow".to_string()))?;

        let claims = Claims {
            sub: telegram_id.to_string(),
            exp: expiration.timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Resolve a bearer token to the telegram user id it was issued for.
    pub fn authenticate(&self, token: &str) -> Result<String> {
        // Expiry is judged against the injected clock below, without leeway.
        let mut validation = Validation::default();
        validation.validate_exp = false;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!("Rejected session token: {}", e);
            AppError::InvalidSession
        })?;

        if self.clock.now().timestamp() >= token_data.claims.exp {
            return Err(AppError::InvalidSession);
        }

        Ok(token_data.claims.sub)
    }
}
