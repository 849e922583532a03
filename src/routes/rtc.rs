use std::sync::Arc;

use axum::{
    Router, routing::get, response::IntoResponse,
    extract::{ws::{WebSocketUpgrade, WebSocket, Message}, Query, Extension},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::{
    config::ServerConfig,
    error::{bad, AppErr, AppResult},
    model::SignalMessage,
    state::RoomMap,
    utils::jwt::{self, Claims},
};

#[derive(Deserialize)] struct RtcQuery { access_token:String }

pub fn router() -> Router {
    Router::new().route("/rtc", get(rtc_handler))
}

async fn rtc_handler(
    ws: WebSocketUpgrade,
    Query(q): Query<RtcQuery>,
    Extension(cfg): Extension<Arc<ServerConfig>>,
    Extension(rooms): Extension<RoomMap>,
) -> AppResult<impl IntoResponse> {
    let claims = jwt::verify(&q.access_token, &cfg.jwt_secret)
        .map_err(|e| AppErr::Unauthorized(e.to_string()))?;
    if !rooms.read().await.contains_key(&claims.room) {
        return Err(bad("room not found"));
    }
    Ok(ws.on_upgrade(move |s| participant(s, claims, rooms)))
}

/* ---------------- per participant ---------------- */
async fn participant(sock: WebSocket, claims: Claims, rooms: RoomMap) {
    let (mut sink, mut stream) = sock.split();

    /* 進房 */
    let (mut rx, metadata, present) = {
        let mut m = rooms.write().await;
        let Some(st) = m.get_mut(&claims.room) else { return };
        st.participants.push(claims.sub.clone());
        (st.tx.subscribe(), st.metadata.clone(), st.participants.len())
    };
    info!(room = %claims.room, identity = %claims.sub, name = %claims.name, participants = present, "participant joined");

    let joined = SignalMessage::Joined { room: claims.room.clone(), metadata: Some(metadata) };
    if sink.send(Message::Text(joined.encode())).await.is_ok() {
        loop {
            tokio::select! {
                update = rx.recv() => match update {
                    Ok(metadata) => {
                        let msg = SignalMessage::MetadataChanged { metadata }.encode();
                        if sink.send(Message::Text(msg)).await.is_err() { break; }
                    }
                    Err(RecvError::Lagged(n)) => warn!(room = %claims.room, skipped = n, "participant lagged"),
                    Err(RecvError::Closed) => break,
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}  // participant 不送東西
                },
            }
        }
    }
    sink.close().await.ok();

    /* 離房 */
    let present = match rooms.write().await.get_mut(&claims.room) {
        Some(st) => {
            st.participants.retain(|id| id != &claims.sub);
            st.participants.len()
        }
        None => 0,
    };
    info!(room = %claims.room, identity = %claims.sub, participants = present, "participant left");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{client::transport::{RoomTransport, WsTransport}, routes::spawn_test_server};
    use std::time::Duration;

    #[tokio::test]
    async fn token_for_unknown_room_is_refused() {
        let (_, ws) = spawn_test_server(ServerConfig::default()).await;
        let token = jwt::sign("User a", "Name a", "Room ghost", 60, "secret").unwrap();

        let mut t = WsTransport::new(Duration::from_secs(5));
        assert!(matches!(t.connect(&ws, &token).await, Err(AppErr::Connection(_))));
    }

    #[tokio::test]
    async fn token_signed_elsewhere_is_refused() {
        let (_, ws) = spawn_test_server(ServerConfig::default()).await;
        let token = jwt::sign("User a", "Name a", "Room a", 60, "not-the-secret").unwrap();

        let mut t = WsTransport::new(Duration::from_secs(5));
        assert!(t.connect(&ws, &token).await.is_err());
    }

    async fn roster(rooms: &RoomMap, room: &str) -> Vec<String> {
        rooms.read().await.get(room).map(|st| st.participants.clone()).unwrap_or_default()
    }

    #[tokio::test]
    async fn roster_follows_join_and_leave() {
        let rooms = RoomMap::default();
        rooms.write().await.insert("Room a".into(), crate::state::RoomState::new(r#"{"counter":0}"#.into()));
        let app = router()
            .layer(Extension(Arc::new(ServerConfig::default())))
            .layer(Extension(rooms.clone()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app.into_make_service()).await.unwrap() });

        let token = jwt::sign("User a", "Name a", "Room a", 60, "secret").unwrap();
        let mut t = WsTransport::new(Duration::from_secs(5));
        t.connect(&ws, &token).await.unwrap();
        assert_eq!(roster(&rooms, "Room a").await, vec!["User a".to_string()]);

        t.disconnect().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !roster(&rooms, "Room a").await.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}
