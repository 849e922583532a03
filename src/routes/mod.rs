use std::sync::Arc;

use axum::{routing::get, Extension, Router, extract::DefaultBodyLimit};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer};

use crate::{config::ServerConfig, state::{RoomMap, RoomSeq}};

pub mod room;
pub mod rtc;

const BODY_LIMIT: usize = 64 * 1024;

pub fn router() -> Router {
    Router::new()
        .route("/", get(home))
        .merge(room::router())
        .merge(rtc::router())
}

/// Full backend with shared state and layers attached.
pub fn app(cfg: ServerConfig) -> Router {
    router()
        .layer(Extension(Arc::new(cfg)))
        .layer(Extension(RoomMap::default()))
        .layer(Extension(RoomSeq::default()))
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
}

async fn home() -> &'static str {
    "Hello, you've reached the homepage!"
}

/* 測試用：起一個真的 backend，回傳 (http, ws) base url */
#[cfg(test)]
pub(crate) async fn spawn_test_server(cfg: ServerConfig) -> (String, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(cfg).into_make_service()).await.unwrap();
    });
    (format!("http://{addr}"), format!("ws://{addr}"))
}
