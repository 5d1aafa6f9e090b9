use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::{
    config::Config,
    constants::{NOTIFY_CONNECT_TIMEOUT_SECS, NOTIFY_TIMEOUT_SECS},
    error::{AppError, Result},
    services::games::Game,
};

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Best-effort win notices through the Telegram Bot API.
#[derive(Clone)]
pub struct NotificationService {
    inner: Option<TelegramNotifier>,
}

#[derive(Clone)]
struct TelegramNotifier {
    api_url: String,
    bot_token: String,
    client: Client,
}

impl NotificationService {
    pub fn new(config: &Config) -> Result<Self> {
        if !config.notify_wins {
            return Ok(Self::disabled());
        }
        let notifier = TelegramNotifier::build(
            &config.telegram_api_url,
            &config.telegram_bot_token,
            Duration::from_secs(NOTIFY_TIMEOUT_SECS),
        )?;
        Ok(Self {
            inner: Some(notifier),
        })
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Fire and forget. Delivery failures are logged and never reach the player.
    pub fn notify_win(&self, chat_id: &str, game: Game, amount: i64) {
        let Some(notifier) = self.inner.clone() else {
            return;
        };
        let chat_id = chat_id.to_string();
        let text = format_win_message(game, amount);

        tokio::spawn(async move {
            if let Err(e) = notifier.send_message(&chat_id, &text).await {
                tracing::warn!("Win notification to {} failed: {}", chat_id, e);
            }
        });
    }
}

impl TelegramNotifier {
    fn build(api_url: &str, bot_token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(NOTIFY_CONNECT_TIMEOUT_SECS).min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Telegram HTTP client init failed: {}", e)))?;

        Ok(Self {
            api_url: api_url.to_string(),
            bot_token: bot_token.to_string(),
            client,
        })
    }

    fn endpoint(&self) -> Result<Url> {
        Url::parse(&format!(
            "{}/bot{}/sendMessage",
            self.api_url.trim_end_matches('/'),
            self.bot_token
        ))
        .map_err(|e| AppError::ExternalAPI(format!("invalid Telegram API url: {}", e)))
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.endpoint()?)
            .json(&SendMessage { chat_id, text })
            .send()
            .await
            .map_err(|e| AppError::ExternalAPI(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AppError::ExternalAPI(format!(
                "sendMessage returned {}",
                resp.status()
            )));
        }

        tracing::debug!("Win notification delivered to {}", chat_id);
        Ok(())
    }
}

pub fn format_win_message(game: Game, amount: i64) -> String {
    format!("🎉 You won {} ⭐ in {}!", amount, game)
}
