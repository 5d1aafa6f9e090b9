use chrono::{DateTime, Utc};
use hmac::Mac;
use serde::Deserialize;

use crate::constants::{DEFAULT_PLAYER_PREFIX, TELEGRAM_WEBAPP_KEY};
use crate::crypto::hash;
use crate::error::{AppError, Result};

/// Identity of the user who launched the Mini App.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct RawTelegramUser {
    id: i64,
    username: Option<String>,
    first_name: Option<String>,
}

impl From<RawTelegramUser> for TelegramUser {
    fn from(raw: RawTelegramUser) -> Self {
        let username = raw
            .username
            .filter(|name| !name.trim().is_empty())
            .or_else(|| raw.first_name.filter(|name| !name.trim().is_empty()))
            .unwrap_or_else(|| format!("{}{}", DEFAULT_PLAYER_PREFIX, raw.id));

        Self {
            id: raw.id.to_string(),
            username,
        }
    }
}

/// Verifies Telegram Mini-App `initData` signatures.
///
/// The check follows Telegram's WebApp scheme: the secret key is
/// `HMAC_SHA256("WebAppData", bot_token)` and the expected hash is
/// `HMAC_SHA256(secret_key, data_check_string)`, where the data-check string
/// is every field except `hash`, sorted by key, rendered as `key=value` and
/// joined with `\n`.
pub struct InitDataVerifier {
    secret_key: Vec<u8>,
    max_age_secs: i64,
}

impl InitDataVerifier {
    /// `max_age_secs == 0` disables the `auth_date` freshness check.
    pub fn new(bot_token: &str, max_age_secs: i64) -> Self {
        Self {
            secret_key: derive_secret_key(bot_token),
            max_age_secs,
        }
    }

    pub fn verify(&self, init_data: &str, now: DateTime<Utc>) -> Result<TelegramUser> {
        let mut pairs = parse_pairs(init_data);

        let hash_index = pairs
            .iter()
            .position(|(key, _)| key == "hash")
            .ok_or_else(|| AppError::MalformedPayload("missing hash field".to_string()))?;
        let (_, supplied_hash) = pairs.remove(hash_index);

        let user_json = pairs
            .iter()
            .find(|(key, _)| key == "user")
            .map(|(_, value)| value.clone())
            .ok_or_else(|| AppError::MalformedPayload("missing user field".to_string()))?;

        let supplied = hex::decode(supplied_hash.trim())
            .map_err(|_| AppError::AuthError("Invalid signature".to_string()))?;

        let mut mac = hash::keyed(&self.secret_key);
        mac.update(data_check_string(&pairs).as_bytes());
        mac.verify_slice(&supplied)
            .map_err(|_| AppError::AuthError("Invalid signature".to_string()))?;

        self.check_auth_date(&pairs, now)?;

        let raw: RawTelegramUser = serde_json::from_str(&user_json)
            .map_err(|e| AppError::MalformedPayload(format!("user field is not valid JSON: {}", e)))?;

        tracing::debug!("initData verified for telegram user {}", raw.id);
        Ok(raw.into())
    }

    fn check_auth_date(&self, pairs: &[(String, String)], now: DateTime<Utc>) -> Result<()> {
        if self.max_age_secs <= 0 {
            return Ok(());
        }
        let Some((_, raw)) = pairs.iter().find(|(key, _)| key == "auth_date") else {
            return Ok(());
        };
        let auth_date: i64 = raw
            .parse()
            .map_err(|_| AppError::MalformedPayload("auth_date is not a number".to_string()))?;

        let age = now
            .timestamp()
            .checked_sub(auth_date)
            .ok_or_else(|| AppError::AuthError("auth_date out of range".to_string()))?;
        if age > self.max_age_secs {
            return Err(AppError::AuthError("initData expired".to_string()));
        }
        Ok(())
    }
}

fn derive_secret_key(bot_token: &str) -> Vec<u8> {
    hash::hmac_sha256(TELEGRAM_WEBAPP_KEY, bot_token.as_bytes())
}

fn parse_pairs(init_data: &str) -> Vec<(String, String)> {
    let trimmed = init_data.trim().trim_start_matches('?');
    url::form_urlencoded::parse(trimmed.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Sorted `key=value` lines, excluding `hash`.
pub fn data_check_string(pairs: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = pairs.iter().filter(|(key, _)| key != "hash").collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds a correctly signed `initData` string, the way Telegram does.
#[cfg(test)]
pub fn sign_init_data(fields: &[(&str, &str)], bot_token: &str) -> String {
    let pairs: Vec<(String, String)> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let digest = hash::hmac_sha256_hex(
        &derive_secret_key(bot_token),
        data_check_string(&pairs).as_bytes(),
    );

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("hash", &digest);
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BOT_TOKEN: &str = "123456:TEST-BOT-TOKEN";
    const USER: &str = r#"{"id":42,"first_name":"Ann","username":"ann"}"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn auth_date() -> String {
        (now().timestamp() - 60).to_string()
    }

    fn verifier() -> InitDataVerifier {
        InitDataVerifier::new(BOT_TOKEN, 86400)
    }

    #[test]
    fn valid_payload_yields_user() {
        let auth_date = auth_date();
        let init_data = sign_init_data(
            &[("query_id", "AAH"), ("user", USER), ("auth_date", &auth_date)],
            BOT_TOKEN,
        );
        let user = verifier().verify(&init_data, now()).unwrap();
        assert_eq!(
            user,
            TelegramUser {
                id: "42".to_string(),
                username: "ann".to_string()
            }
        );
    }

    #[test]
    fn field_order_does_not_matter() {
        let auth_date = auth_date();
        let init_data = sign_init_data(
            &[("user", USER), ("auth_date", &auth_date), ("chat_type", "private")],
            BOT_TOKEN,
        );
        assert!(verifier().verify(&init_data, now()).is_ok());
    }

    #[test]
    fn data_check_string_is_sorted_and_skips_hash() {
        let pairs = vec![
            ("user".to_string(), "u".to_string()),
            ("hash".to_string(), "h".to_string()),
            ("auth_date".to_string(), "1".to_string()),
        ];
        assert_eq!(data_check_string(&pairs), "auth_date=1\nuser=u");
    }

    #[test]
    fn altering_any_value_invalidates_signature() {
        let auth_date = auth_date();
        let fields = [("query_id", "AAH"), ("user", USER), ("auth_date", auth_date.as_str())];
        let init_data = sign_init_data(&fields, BOT_TOKEN);

        let tampered = init_data.replace("AAH", "AAI");
        match verifier().verify(&tampered, now()) {
            Err(AppError::AuthError(_)) => {}
            other => panic!("expected AuthError, got {other:?}"),
        }

        let tampered = init_data.replace("ann", "anm");
        assert!(matches!(
            verifier().verify(&tampered, now()),
            Err(AppError::AuthError(_))
        ));
    }

    #[test]
    fn wrong_bot_token_is_rejected() {
        let auth_date = auth_date();
        let init_data = sign_init_data(&[("user", USER), ("auth_date", &auth_date)], "other:token");
        assert!(matches!(
            verifier().verify(&init_data, now()),
            Err(AppError::AuthError(_))
        ));
    }

    #[test]
    fn missing_hash_is_malformed() {
        let init_data = "user=%7B%22id%22%3A42%7D&auth_date=1";
        assert!(matches!(
            verifier().verify(init_data, now()),
            Err(AppError::MalformedPayload(_))
        ));
    }

    #[test]
    fn missing_user_is_malformed() {
        let auth_date = auth_date();
        let init_data = sign_init_data(&[("auth_date", &auth_date)], BOT_TOKEN);
        assert!(matches!(
            verifier().verify(&init_data, now()),
            Err(AppError::MalformedPayload(_))
        ));
    }

    #[test]
    fn user_that_is_not_json_is_malformed() {
        let auth_date = auth_date();
        let init_data = sign_init_data(&[("user", "not-json"), ("auth_date", &auth_date)], BOT_TOKEN);
        assert!(matches!(
            verifier().verify(&init_data, now()),
            Err(AppError::MalformedPayload(_))
        ));
    }

    #[test]
    fn non_hex_hash_is_rejected() {
        let init_data = "user=%7B%22id%22%3A42%7D&hash=zzzz";
        assert!(matches!(
            verifier().verify(init_data, now()),
            Err(AppError::AuthError(_))
        ));
    }

    #[test]
    fn stale_auth_date_is_rejected() {
        let stale = (now().timestamp() - 86401).to_string();
        let init_data = sign_init_data(&[("user", USER), ("auth_date", &stale)], BOT_TOKEN);
        assert!(matches!(
            verifier().verify(&init_data, now()),
            Err(AppError::AuthError(_))
        ));

        let lenient = InitDataVerifier::new(BOT_TOKEN, 0);
        assert!(lenient.verify(&init_data, now()).is_ok());
    }

    #[test]
    fn extreme_auth_date_is_rejected_not_panicking() {
        let ancient = i64::MIN.to_string();
        let init_data = sign_init_data(&[("user", USER), ("auth_date", &ancient)], BOT_TOKEN);
        assert!(matches!(
            verifier().verify(&init_data, now()),
            Err(AppError::AuthError(_))
        ));
    }

    #[test]
    fn default_max_age_is_one_hour() {
        let verifier = InitDataVerifier::new(BOT_TOKEN, crate::constants::INIT_DATA_MAX_AGE_SECS);

        let fresh = (now().timestamp() - 3600).to_string();
        let init_data = sign_init_data(&[("user", USER), ("auth_date", &fresh)], BOT_TOKEN);
        assert!(verifier.verify(&init_data, now()).is_ok());

        let stale = (now().timestamp() - 3601).to_string();
        let init_data = sign_init_data(&[("user", USER), ("auth_date", &stale)], BOT_TOKEN);
        assert!(matches!(
            verifier.verify(&init_data, now()),
            Err(AppError::AuthError(_))
        ));
    }

    #[test]
    fn username_falls_back_to_first_name_then_id() {
        let raw: RawTelegramUser = serde_json::from_str(r#"{"id":7,"first_name":"Bo"}"#).unwrap();
        assert_eq!(TelegramUser::from(raw).username, "Bo");

        let raw: RawTelegramUser = serde_json::from_str(r#"{"id":7}"#).unwrap();
        assert_eq!(TelegramUser::from(raw).username, "player_7");
    }
}
