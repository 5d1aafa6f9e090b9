use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod constants;
mod crypto;
mod db;
mod error;
mod models;
mod services;
mod utils;

use config::Config;
use db::{Database, InMemoryStorage, Store};
use services::RandomDealer;
use utils::SystemClock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "star_casino=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting Star Casino backend");
    tracing::info!("Environment: {}", config.environment);

    let store = open_store(&config).await?;
    tracing::info!("Storage backend: {}", store.backend());

    let app_state = api::AppState::new(
        config.clone(),
        store,
        Arc::new(SystemClock),
        Arc::new(RandomDealer),
    )?;

    // Build router
    let app = build_router(app_state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    if config.database_url.is_none() {
        tracing::info!("Using in-memory storage");
        return Ok(Arc::new(InMemoryStorage::new()));
    }

    let db = Database::new(config).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db.run_migrations().await?;

    Ok(Arc::new(db))
}

fn build_router(state: api::AppState) -> Router {
    // CORS configuration
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Authentication
        .route("/auth", post(api::auth::login))
        .route("/api/auth/login", post(api::auth::login))
        // Account
        .route("/api/user/profile", get(api::profile::get_profile))
        .route("/api/user/deposit", post(api::wallet::deposit))
        .route("/api/user/withdraw", post(api::wallet::withdraw))
        .route("/api/user/deposits", get(api::wallet::list_deposits))
        .route("/api/user/transactions", get(api::transactions::get_history))
        .route("/api/transactions", get(api::transactions::get_history))
        // Games
        .route("/api/game/list", get(api::game::list_games))
        .route("/api/game/spin", post(api::game::spin))
        .route("/api/game/play", post(api::game::play))
        .route("/api/game/recent-winners", get(api::game::recent_winners))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::crypto::signature::sign_init_data;
    use crate::services::games::{losing_slots, FixedDealer, Outcome, Symbol};
    use crate::utils::{Clock, ManualClock};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        store: InMemoryStorage,
        clock: Arc<ManualClock>,
    }

    fn harness(outcome: Outcome) -> Harness {
        let store = InMemoryStorage::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let state = api::AppState::new(
            test_config(),
            Arc::new(store.clone()),
            clock.clone(),
            Arc::new(FixedDealer(outcome)),
        )
        .unwrap();
        Harness {
            app: build_router(state),
            store,
            clock,
        }
    }

    impl Harness {
        fn init_data(&self, id: u64) -> String {
            let auth_date = self.clock.now().timestamp().to_string();
            let user = format!(r#"{{"id":{},"username":"player{}"}}"#, id, id);
            sign_init_data(
                &[("user", &user), ("auth_date", &auth_date)],
                &test_config().telegram_bot_token,
            )
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, body)
        }

        async fn login(&self, id: u64) -> String {
            let (status, body) = self
                .send(post_json("/auth", None, json!({ "initData": self.init_data(id) })))
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            body["token"].as_str().unwrap().to_string()
        }
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_with(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_storage_backend() {
        let h = harness(losing_slots());
        let (status, body) = h.send(get_with("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["storage"], "memory: connected");
    }

    #[tokio::test]
    async fn login_returns_token_and_public_user() {
        let h = harness(losing_slots());
        let (status, body) = h
            .send(post_json(
                "/api/auth/login",
                None,
                json!({ "initData": h.init_data(42) }),
            ))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["expiresIn"], 3600);
        assert_eq!(body["user"]["id"], "42");
        assert_eq!(body["user"]["username"], "player42");
        assert_eq!(body["user"]["balance"], 1000);
    }

    #[tokio::test]
    async fn malformed_or_forged_login_is_rejected_without_creating_users() {
        let h = harness(losing_slots());

        let (status, body) = h
            .send(post_json("/auth", None, json!({ "initData": "user=%7B%7D" })))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "MALFORMED_PAYLOAD");

        let forged = h.init_data(42).replace("player42", "player43");
        let (status, body) = h
            .send(post_json("/auth", None, json!({ "initData": forged })))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        assert!(h.store.get_user("42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn protected_routes_require_a_valid_session() {
        let h = harness(losing_slots());

        let (status, body) = h.send(get_with("/api/user/profile", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "UNAUTHENTICATED");

        let (status, body) = h
            .send(get_with("/api/user/profile", Some("garbage")))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "INVALID_SESSION");

        let basic = Request::builder()
            .uri("/api/transactions")
            .header(header::AUTHORIZATION, "Basic abc")
            .body(Body::empty())
            .unwrap();
        let (status, _) = h.send(basic).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn bearer_without_token_is_unauthenticated() {
        let h = harness(losing_slots());
        for value in ["Bearer ", "Bearer", "Bearer    "] {
            let request = Request::builder()
                .uri("/api/user/profile")
                .header(header::AUTHORIZATION, value)
                .body(Body::empty())
                .unwrap();
            let (status, body) = h.send(request).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{value:?}");
            assert_eq!(body["error"], "UNAUTHENTICATED");
        }

        let glued = Request::builder()
            .uri("/api/user/profile")
            .header(header::AUTHORIZATION, "Bearerabc")
            .body(Body::empty())
            .unwrap();
        let (status, _) = h.send(glued).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unparseable_bodies_answer_in_the_error_envelope() {
        let h = harness(losing_slots());
        let token = h.login(42).await;

        let (status, body) = h
            .send(post_json("/api/game/spin", Some(&token), json!({})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_BET");

        let (status, body) = h
            .send(post_json("/api/game/spin", Some(&token), json!({ "bet": 12.5 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_BET");

        let (status, body) = h
            .send(post_json("/api/user/deposit", Some(&token), json!({ "amount": 60.5 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_AMOUNT");

        let (status, body) = h
            .send(post_json("/api/user/withdraw", Some(&token), json!({ "amount": "60" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_AMOUNT");

        let (status, body) = h
            .send(post_json(
                "/api/game/play",
                Some(&token),
                json!({ "game": "poker", "bet": 10 }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BAD_REQUEST");
        assert_eq!(body["success"], false);

        let not_json = Request::builder()
            .method("POST")
            .uri("/api/user/deposit")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from("{amount:"))
            .unwrap();
        let (status, body) = h.send(not_json).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BAD_REQUEST");

        let (_, profile) = h.send(get_with("/api/user/profile", Some(&token))).await;
        assert_eq!(profile["balance"], 1000);
        assert!(h.store.list_transactions("42").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn session_expires_after_an_hour() {
        let h = harness(losing_slots());
        let token = h.login(42).await;

        h.clock.advance(Duration::minutes(59));
        let (status, _) = h.send(get_with("/api/user/profile", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);

        h.clock.advance(Duration::minutes(2));
        let (status, _) = h.send(get_with("/api/user/profile", Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn deposit_withdraw_and_lose_a_spin() {
        let h = harness(losing_slots());
        let token = h.login(42).await;

        let (status, body) = h
            .send(post_json("/api/user/deposit", Some(&token), json!({ "amount": 100 })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], 1100);

        let (status, body) = h
            .send(post_json("/api/user/withdraw", Some(&token), json!({ "amount": 50 })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], 1050);

        let (status, body) = h
            .send(post_json("/api/game/spin", Some(&token), json!({ "bet": 10 })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["winAmount"], 0);
        assert_eq!(body["balance"], 1040);
        assert_eq!(body["reels"], json!(["7", "🍒", "🍋"]));

        let (status, body) = h
            .send(get_with("/api/user/transactions", Some(&token)))
            .await;
        assert_eq!(status, StatusCode::OK);
        let kinds: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["type"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["loss", "withdraw", "deposit"]);

        let (_, body) = h.send(get_with("/api/user/deposits", Some(&token))).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["amount"], 100);
    }

    #[tokio::test]
    async fn invalid_amounts_and_bets_are_bad_requests() {
        let h = harness(losing_slots());
        let token = h.login(42).await;

        for body in [json!({ "amount": 49 }), json!({ "amount": -5 }), json!({})] {
            let (status, resp) = h
                .send(post_json("/api/user/deposit", Some(&token), body))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(resp["error"], "INVALID_AMOUNT");
        }

        let (status, resp) = h
            .send(post_json("/api/user/withdraw", Some(&token), json!({ "amount": 5000 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "INSUFFICIENT_FUNDS");

        let (status, resp) = h
            .send(post_json(
                "/api/game/play",
                Some(&token),
                json!({ "game": "blackjack", "bet": 10 }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "INVALID_BET");

        let (_, profile) = h.send(get_with("/api/user/profile", Some(&token))).await;
        assert_eq!(profile["balance"], 1000);
    }

    #[tokio::test]
    async fn wins_show_up_in_recent_winners_and_profile() {
        let h = harness(Outcome::Slots {
            reels: [Symbol::Cherry; 3],
        });
        let token = h.login(42).await;

        let (status, body) = h
            .send(post_json(
                "/api/game/play",
                Some(&token),
                json!({ "game": "slots", "bet": 20 }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["game"], "slots");
        assert_eq!(body["winAmount"], 100);
        assert_eq!(body["balance"], 1080);

        let (status, winners) = h.send(get_with("/api/game/recent-winners", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(winners[0]["username"], "player42");
        assert_eq!(winners[0]["amount"], 100);

        let (_, profile) = h.send(get_with("/api/user/profile", Some(&token))).await;
        assert_eq!(profile["achievements"][0]["code"], "first_win");
    }

    #[tokio::test]
    async fn recent_winners_are_capped() {
        let h = harness(Outcome::Wheel {
            segment: 1,
            multiplier: 2,
        });
        let token = h.login(42).await;
        for _ in 0..5 {
            let (status, _) = h
                .send(post_json(
                    "/api/game/play",
                    Some(&token),
                    json!({ "game": "wheel", "bet": 5 }),
                ))
                .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (_, winners) = h.send(get_with("/api/game/recent-winners", None)).await;
        assert_eq!(winners.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn game_list_exposes_minimum_bets() {
        let h = harness(losing_slots());
        let (status, body) = h.send(get_with("/api/game/list", None)).await;
        assert_eq!(status, StatusCode::OK);
        let games = body.as_array().unwrap();
        assert_eq!(games.len(), 4);
        assert_eq!(games[2]["game"], "blackjack");
        assert_eq!(games[2]["minBet"], 20);
    }

    #[test]
    fn cors_accepts_origin_list() {
        let mut config = test_config();
        config.cors_allowed_origins = "https://web.telegram.org, https://example.org".to_string();
        let _ = cors_from_config(&config);
    }
}
