//! Realtime room transport.
//!
//! [`RoomTransport`] is the boundary to whatever hosts the room. The handle
//! exists before it is connected so a metadata listener can be attached
//! first; `subscribe` hands out the raw metadata-changed payloads and
//! `metadata` always holds the latest value seen.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{stream::{SplitSink, SplitStream}, SinkExt, StreamExt};
use tokio::{
    net::TcpStream,
    sync::{broadcast, watch},
    task::JoinHandle,
    time,
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{conn, AppErr, AppResult},
    model::SignalMessage,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[async_trait]
pub trait RoomTransport: Send + 'static {
    /// Join the room the token grants; resolves once the room is joined.
    async fn connect(&mut self, url: &str, token: &str) -> AppResult<()>;
    /// Leave the room; resolves once the connection is closed.
    async fn disconnect(&mut self) -> AppResult<()>;
    fn name(&self) -> Option<String>;
    fn metadata(&self) -> watch::Receiver<Option<String>>;
    fn subscribe(&self) -> broadcast::Receiver<String>;
}

/* ------------ WebSocket room hub client ------------ */
pub struct WsTransport {
    name:            Option<String>,
    metadata:        Arc<watch::Sender<Option<String>>>,
    events:          broadcast::Sender<String>,
    sink:            Option<SplitSink<WsStream, Message>>,
    reader:          Option<JoinHandle<()>>,
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        let (metadata, _) = watch::channel(None);
        let (events, _)   = broadcast::channel(64);
        Self {
            name: None,
            metadata: Arc::new(metadata),
            events,
            sink: None,
            reader: None,
            connect_timeout,
        }
    }
}

/// `{base}/rtc?access_token={token}`
pub fn rtc_endpoint(base: &str, token: &str) -> AppResult<Url> {
    let mut url = Url::parse(&format!("{}/rtc", base.trim_end_matches('/'))).map_err(conn)?;
    url.query_pairs_mut().append_pair("access_token", token);
    Ok(url)
}

#[async_trait]
impl RoomTransport for WsTransport {
    async fn connect(&mut self, url: &str, token: &str) -> AppResult<()> {
        if self.sink.is_some() {
            return Err(conn("already connected"));
        }
        let endpoint = rtc_endpoint(url, token)?;
        let (sink, stream, room, metadata) = time::timeout(self.connect_timeout, handshake(endpoint))
            .await
            .map_err(|_| AppErr::Connection("timed out joining room".into()))??;
        debug!(room = %room, "room joined");

        self.name = Some(room);
        self.metadata.send_replace(metadata.clone());
        // join 時的 metadata 先進 events，之後才輪到 read_loop
        if let Some(m) = metadata {
            self.events.send(m).ok();
        }
        self.reader = Some(tokio::spawn(read_loop(stream, self.metadata.clone(), self.events.clone())));
        self.sink = Some(sink);
        Ok(())
    }

    async fn disconnect(&mut self) -> AppResult<()> {
        let Some(mut sink) = self.sink.take() else { return Ok(()) };
        let sent = sink.send(Message::Close(None)).await;

        if let Some(mut reader) = self.reader.take() {
            // 等 server 回 close；逾時就硬斷
            if time::timeout(self.connect_timeout, &mut reader).await.is_err() {
                reader.abort();
            }
        }
        sent.map_err(conn)
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn metadata(&self) -> watch::Receiver<Option<String>> {
        self.metadata.subscribe()
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }
}

type Joined = (SplitSink<WsStream, Message>, SplitStream<WsStream>, String, Option<String>);

/* upgrade + 第一個 frame 一定是 joined */
async fn handshake(endpoint: Url) -> AppResult<Joined> {
    let (ws, _) = tokio_tungstenite::connect_async(endpoint.as_str()).await.map_err(conn)?;
    let (sink, mut stream) = ws.split();

    let (room, metadata) = match stream.next().await {
        Some(Ok(Message::Text(raw))) => match SignalMessage::decode(&raw).map_err(conn)? {
            SignalMessage::Joined { room, metadata } => (room, metadata),
            other => return Err(conn(format!("expected joined, got {other:?}"))),
        },
        Some(Ok(other)) => return Err(conn(format!("unexpected frame {other:?}"))),
        Some(Err(e)) => return Err(conn(e)),
        None => return Err(conn("closed before room join")),
    };
    Ok((sink, stream, room, metadata))
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    metadata: Arc<watch::Sender<Option<String>>>,
    events: broadcast::Sender<String>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(raw)) => match SignalMessage::decode(&raw) {
                Ok(SignalMessage::MetadataChanged { metadata: m }) => {
                    metadata.send_replace(Some(m.clone()));
                    events.send(m).ok();
                }
                Ok(SignalMessage::Joined { .. }) => {}
                Err(e) => warn!(error = %e, "ignoring unknown room frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "room connection dropped");
                break;
            }
        }
    }
}

/* ------------ 測試用 in-process transport ------------ */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ServerConfig,
        model::{RoomCredentials, RoomMetadata},
        routes::spawn_test_server,
    };
    use serde_json::json;

    async fn create_room(http: &str) -> RoomCredentials {
        reqwest::Client::new().post(format!("{http}/create-room"))
            .json(&json!({})).send().await.unwrap()
            .json().await.unwrap()
    }

    #[test]
    fn endpoint_carries_token() {
        let url = rtc_endpoint("ws://localhost:8101/", "a.b c").unwrap();
        assert_eq!(url.path(), "/rtc");
        assert_eq!(url.query(), Some("access_token=a.b+c"));
    }

    #[tokio::test]
    async fn connect_reports_room_name_and_metadata() {
        let (http, ws) = spawn_test_server(ServerConfig::default()).await;
        let creds = create_room(&http).await;

        let mut t = WsTransport::new(Duration::from_secs(5));
        t.connect(&ws, &creds.token).await.unwrap();

        assert_eq!(t.name().as_deref(), Some(creds.room_name.as_str()));
        let meta = t.metadata().borrow().clone().unwrap();
        assert_eq!(RoomMetadata::parse(&meta).unwrap().counter, 0);

        t.disconnect().await.unwrap();
        t.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn increment_reaches_participant() {
        let (http, ws) = spawn_test_server(ServerConfig::default()).await;
        let creds = create_room(&http).await;

        let mut t = WsTransport::new(Duration::from_secs(5));
        let mut events = t.subscribe();
        t.connect(&ws, &creds.token).await.unwrap();

        reqwest::Client::new().post(format!("{http}/counter-increment"))
            .json(&json!({ "roomName": creds.room_name })).send().await.unwrap();

        // join 時的 snapshot 先到，再來才是 increment
        let raw = time::timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
        assert_eq!(raw, r#"{"counter":0}"#);
        let raw = time::timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
        assert_eq!(raw, r#"{"counter":1}"#);
        assert_eq!(t.metadata().borrow().as_deref(), Some(r#"{"counter":1}"#));
    }

    #[tokio::test]
    async fn silent_upgrade_respects_connect_timeout() {
        // 收 TCP 但永遠不回 upgrade
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                held.push(sock);
            }
        });

        let mut t = WsTransport::new(Duration::from_millis(200));
        let joined = time::timeout(Duration::from_secs(3), t.connect(&format!("ws://{addr}"), "t1")).await;
        let err = joined.expect("connect hung past its own timeout").unwrap_err();
        assert!(matches!(err, AppErr::Connection(_)));
        assert!(t.name().is_none());
    }

    #[tokio::test]
    async fn bad_token_is_a_connection_error() {
        let (_, ws) = spawn_test_server(ServerConfig::default()).await;
        let mut t = WsTransport::new(Duration::from_secs(5));
        let err = t.connect(&ws, "not-a-token").await.unwrap_err();
        assert!(matches!(err, AppErr::Connection(_)));
        assert!(t.name().is_none());
    }
}
