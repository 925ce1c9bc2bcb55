//! Shared error taxonomy. No HTTP framework dependency lives here — callers
//! map `status_label`/`http_status_code` onto whatever transport they own.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Account locked: {0}")]
    AccountLocked(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Too many requests")]
    RateLimit,

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl AppError {
    /// Stable label for structured logging and API error bodies — never the
    /// underlying `anyhow` detail, per the no-leak policy for internal errors.
    pub fn status_label(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::AuthenticationFailed => "authentication_failed",
            AppError::AccountLocked(_) => "account_locked",
            AppError::TokenExpired => "token_expired",
            AppError::InvalidToken(_) => "invalid_token",
            AppError::Conflict(_) => "conflict",
            AppError::RateLimit => "rate_limited",
            AppError::InternalError(_) => "internal_error",
            AppError::ConfigError(_) => "internal_error",
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::BadRequest(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::Unauthorized(_) => 401,
            AppError::Forbidden(_) => 403,
            AppError::AuthenticationFailed => 401,
            AppError::AccountLocked(_) => 403,
            AppError::TokenExpired => 401,
            AppError::InvalidToken(_) => 401,
            AppError::Conflict(_) => 409,
            AppError::RateLimit => 400,
            AppError::InternalError(_) | AppError::ConfigError(_) => 500,
        }
    }

    /// Message safe to return to a caller. Internal errors never surface their
    /// `anyhow::Error` chain — only `tracing::error!` sees that detail.
    pub fn public_message(&self) -> String {
        match self {
            AppError::InternalError(_) | AppError::ConfigError(_) => {
                "An internal server error occurred".to_string()
            }
            AppError::AuthenticationFailed => "Authentication failed".to_string(),
            AppError::AccountLocked(_) => "Account locked".to_string(),
            other => other.to_string(),
        }
    }
}
