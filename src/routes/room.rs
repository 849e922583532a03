//! routes/room.rs
use std::sync::{atomic::Ordering, Arc};

use axum::{
    routing::post,
    extract::{Extension, Json},
    http::StatusCode,
    Router,
};
use tracing::info;

use crate::{
    config::ServerConfig,
    error::{bad, AppResult},
    model::{CounterIncrementRequest, RoomCredentials, RoomMetadata},
    state::{RoomMap, RoomSeq, RoomState},
    utils::jwt,
};

pub fn router() -> Router {
    Router::new()
        .route("/create-room", post(create_room))
        .route("/counter-increment", post(counter_increment))
}

fn short_id() -> String {
    nanoid::nanoid!(22)
}

/* ---------------- Create room ---------------- */
async fn create_room(
    Extension(cfg): Extension<Arc<ServerConfig>>,
    Extension(rooms): Extension<RoomMap>,
    Extension(seq): Extension<RoomSeq>,
) -> AppResult<Json<RoomCredentials>> {
    let room_name = format!("Room {}", short_id());
    let identity  = format!("User {}", short_id());
    let name      = format!("Name {}", short_id());

    let counter  = seq.fetch_add(1, Ordering::SeqCst);
    let metadata = RoomMetadata { counter }.encode();
    rooms.write().await.insert(room_name.clone(), RoomState::new(metadata));
    info!(room = %room_name, counter, "room created");

    let token = jwt::sign(&identity, &name, &room_name, cfg.token_ttl_secs, &cfg.jwt_secret)?;
    Ok(Json(RoomCredentials { room_name, token }))
}

/* ---------------- Counter increment ---------------- */
async fn counter_increment(
    Extension(rooms): Extension<RoomMap>,
    payload: Result<Json<CounterIncrementRequest>, axum::extract::rejection::JsonRejection>,
) -> AppResult<StatusCode> {
    let Json(req) = payload.map_err(bad)?;

    let mut m = rooms.write().await;
    let st = m.get_mut(&req.room_name).ok_or_else(|| bad("room not found"))?;

    let current = RoomMetadata::parse(&st.metadata)?;
    let next = current.incremented();
    info!("{} counter: {} -> {}", req.room_name, current.counter, next.counter);

    st.metadata = next.encode();
    // 沒人在房間時 send 會失敗，無所謂
    st.tx.send(st.metadata.clone()).ok();

    Ok(StatusCode::OK)
}
