use axum::{http::StatusCode, response::IntoResponse};
use std::fmt::Display;

pub type AppResult<T> = Result<T, AppErr>;

#[derive(thiserror::Error, Debug)]
pub enum AppErr {
    #[error("Bad request: {0}")]
    Bad(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /* ── client 端 ── */
    #[error("credential request failed: {0}")]
    Credentials(#[source] reqwest::Error),

    #[error("connection: {0}")]
    Connection(String),

    #[error("malformed room metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("busy: {0}")]
    Busy(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("folder controller stopped")]
    Closed,
}

impl IntoResponse for AppErr {
    fn into_response(self) -> axum::response::Response {
        let (code, body) = match self {
            AppErr::Bad(msg)          => (StatusCode::BAD_REQUEST, msg),
            AppErr::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppErr::Token(e)          => (StatusCode::UNAUTHORIZED, e.to_string()),
            other                     => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };
        (code, body).into_response()
    }
}

/* ── 小助手：把任何 error 轉成 Bad / Connection ── */
pub fn bad<E: Display>(e: E) -> AppErr { AppErr::Bad(e.to_string()) }
pub fn conn<E: Display>(e: E) -> AppErr { AppErr::Connection(e.to_string()) }
