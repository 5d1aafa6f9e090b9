use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Malformed initData: {0}")]
    MalformedPayload(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("No session token provided")]
    Unauthenticated,

    #[error("Invalid or expired session")]
    InvalidSession,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("External API error: {0}")]
    ExternalAPI(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code returned in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "STORAGE_ERROR",
            AppError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            AppError::AuthError(_) => "AUTHENTICATION_ERROR",
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::InvalidSession => "INVALID_SESSION",
            AppError::InvalidAmount(_) => "INVALID_AMOUNT",
            AppError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            AppError::InvalidBet(_) => "INVALID_BET",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::ExternalAPI(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedPayload(_) | AppError::AuthError(_) | AppError::Unauthenticated => {
                StatusCode::UNAUTHORIZED
            }
            AppError::InvalidSession => StatusCode::FORBIDDEN,
            AppError::InvalidAmount(_)
            | AppError::InsufficientFunds
            | AppError::InvalidBet(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::ExternalAPI(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Infrastructure failures are logged in full but never echoed to clients.
        let message = if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(ErrorResponse {
            success: false,
            error: self.code().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
