//! Folder page orchestration.
//!
//! [`FolderController`] runs as a single actor task that owns the current
//! [`RoomSession`] and the room credentials; [`FolderHandle`] is the cheap,
//! cloneable side the UI talks to. Commands are handled one at a time, so at
//! most one connection lifecycle is ever in flight.
use std::{
    sync::{atomic::{AtomicBool, Ordering}, Arc},
    time::Duration,
};

use tokio::{
    sync::{broadcast::{self, error::RecvError}, mpsc, oneshot, watch},
    time,
};
use tracing::{debug, warn};

use super::{
    log::MessageLog,
    session::{MetadataBus, RoomSession},
    transport::RoomTransport,
};
use crate::{
    config::ClientConfig,
    error::{conn, AppErr, AppResult},
    model::{ConnectionState, CounterIncrementRequest, RoomCredentials, RoomMetadata, UNKNOWN_COUNTER},
};

enum Command {
    Increment,
    Reconnect(oneshot::Sender<AppResult<()>>),
    Shutdown(oneshot::Sender<()>),
}

/* ---------------- handle ---------------- */
#[derive(Clone)]
pub struct FolderHandle {
    commands:     mpsc::UnboundedSender<Command>,
    counter:      watch::Receiver<i64>,
    state:        watch::Receiver<ConnectionState>,
    log:          MessageLog,
    reconnecting: Arc<AtomicBool>,
}

impl FolderHandle {
    /// Fire-and-forget: queues the increment and returns immediately. The new
    /// value shows up later through [`counter`](Self::counter), once the room
    /// pushes its metadata change; the request's response is never inspected.
    pub fn increment(&self) -> AppResult<()> {
        self.commands.send(Command::Increment).map_err(|_| AppErr::Closed)
    }

    /// Disconnect, wait the configured delay, rejoin with the same
    /// credentials. Fails with `Busy` while another reconnect is running.
    pub async fn reconnect(&self) -> AppResult<()> {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return Err(AppErr::Busy("reconnect already in progress".into()));
        }
        let (done, rx) = oneshot::channel();
        if self.commands.send(Command::Reconnect(done)).is_err() {
            self.reconnecting.store(false, Ordering::SeqCst);
            return Err(AppErr::Closed);
        }
        rx.await.map_err(|_| AppErr::Closed)?
    }

    /// Latest counter; `UNKNOWN_COUNTER` until the room reports one.
    pub fn counter(&self) -> watch::Receiver<i64> {
        self.counter.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub async fn wait_for_counter(&self, target: i64, within: Duration) -> AppResult<()> {
        let mut rx = self.counter.clone();
        let reached = time::timeout(within, async { rx.wait_for(|c| *c == target).await.map(|_| ()) }).await;
        match reached {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(AppErr::Closed),
            Err(_) => Err(AppErr::Timeout(format!("counter never reached {target}"))),
        }
    }

    pub async fn wait_for_state(&self, want: ConnectionState, within: Duration) -> AppResult<()> {
        let mut rx = self.state.clone();
        let reached = time::timeout(within, async { rx.wait_for(|s| *s == want).await.map(|_| ()) }).await;
        match reached {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(AppErr::Closed),
            Err(_) => Err(AppErr::Timeout(format!("state never reached {want:?}"))),
        }
    }

    pub async fn shutdown(&self) -> AppResult<()> {
        let (done, rx) = oneshot::channel();
        self.commands.send(Command::Shutdown(done)).map_err(|_| AppErr::Closed)?;
        rx.await.map_err(|_| AppErr::Closed)
    }
}

/* ---------------- actor ---------------- */
pub struct FolderController<T, F> {
    cfg:            ClientConfig,
    folder:         String,
    http:           reqwest::Client,
    make_transport: F,
    session:        Option<RoomSession<T>>,
    credentials:    Option<RoomCredentials>,
    state:          watch::Sender<ConnectionState>,
    bus:            MetadataBus,
    log:            MessageLog,
    reconnecting:   Arc<AtomicBool>,
}

impl<T, F> FolderController<T, F>
where
    T: RoomTransport,
    F: Fn() -> T + Send + 'static,
{
    /// Starts the page: the actor immediately asks the backend for a room
    /// and joins it. `make_transport` builds one fresh transport per session.
    pub fn spawn(cfg: ClientConfig, folder: impl Into<String>, make_transport: F) -> AppResult<FolderHandle> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(AppErr::Credentials)?;

        let (commands, rx)        = mpsc::unbounded_channel();
        let (bus, _)              = broadcast::channel(64);
        let (counter_tx, counter) = watch::channel(UNKNOWN_COUNTER);
        let (state_tx, state)     = watch::channel(ConnectionState::Idle);
        let log                   = MessageLog::default();
        let reconnecting          = Arc::new(AtomicBool::new(false));

        tokio::spawn(republish(bus.subscribe(), counter_tx));

        let ctl = Self {
            cfg,
            folder: folder.into(),
            http,
            make_transport,
            session: None,
            credentials: None,
            state: state_tx,
            bus,
            log: log.clone(),
            reconnecting: reconnecting.clone(),
        };
        tokio::spawn(ctl.run(rx));

        Ok(FolderHandle { commands, counter, state, log, reconnecting })
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.on_init().await;
        while let Some(cmd) = commands.recv().await {
            match cmd {
                Command::Increment => self.increment().await,
                Command::Reconnect(done) => {
                    let result = self.reconnect().await;
                    self.reconnecting.store(false, Ordering::SeqCst);
                    done.send(result).ok();
                }
                Command::Shutdown(done) => {
                    commands.close();
                    self.close().await;
                    done.send(()).ok();
                    return;
                }
            }
        }
        // 所有 handle 都掉了
        self.close().await;
    }

    fn set_state(&self, s: ConnectionState) {
        debug!(state = ?s, "connection state");
        self.state.send_replace(s);
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn new_session(&self) -> RoomSession<T> {
        RoomSession::new((self.make_transport)(), self.bus.clone(), self.log.clone())
    }

    async fn on_init(&mut self) {
        self.log.info(format!("folder: {}", self.folder)).await;

        let mut session = self.new_session();
        if let Err(e) = session.initialize() {
            self.log.error(format!("metadata listener: {e}")).await;
        }
        self.session = Some(session);

        self.set_state(ConnectionState::AwaitingCredentials);
        match create_room(&self.http, &self.cfg).await {
            Ok(creds) => {
                self.log.info(format!("/create-room: {}", creds.room_name)).await;
                self.join_room(creds).await;
            }
            Err(e) => {
                warn!(error = %e, "create-room request failed");
                self.log.error("failed to create room").await;
                self.set_state(ConnectionState::Failed);
            }
        }
    }

    async fn join_room(&mut self, creds: RoomCredentials) {
        self.credentials = Some(creds.clone());
        self.set_state(ConnectionState::Connecting);

        let url = self.cfg.transport_url.clone();
        let joined = match self.session.as_mut() {
            Some(s) => match s.connect(&url, &creds.token).await {
                Ok(()) => Ok((s.name().unwrap_or_default(), s.metadata())),
                Err(e) => Err(e),
            },
            None => Err(conn("no session to connect")),
        };

        match joined {
            Ok((name, metadata)) => {
                self.log.info(format!(
                    "joined room {name}, room metadata: {}",
                    metadata.as_deref().unwrap_or("null"),
                )).await;
                self.set_state(ConnectionState::Connected);
            }
            Err(e) => {
                self.log.error(format!("failed to join room {}: {e}", creds.room_name)).await;
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    async fn increment(&mut self) {
        let target = self.session.as_ref()
            .and_then(|s| s.name().map(|name| (name, s.metadata_watch())));
        let Some((room_name, metadata)) = target else {
            self.log.error("increment ignored: not joined to a room").await;
            return;
        };

        let req = self.http
            .post(self.cfg.backend_endpoint("counter-increment"))
            .json(&CounterIncrementRequest { room_name });
        tokio::spawn(async move {
            match req.send().await {
                Ok(r) if r.status().is_success() => debug!("counter-increment accepted"),
                Ok(r) => warn!(status = %r.status(), "counter-increment rejected"),
                Err(e) => warn!(error = %e, "counter-increment failed"),
            }
        });

        let log   = self.log.clone();
        let delay = self.cfg.diagnostic_delay;
        tokio::spawn(async move {
            time::sleep(delay).await;
            let current = metadata.borrow().clone();
            log.info(format!(
                "after increment() {delay:?}, room metadata: {}",
                current.as_deref().unwrap_or("null"),
            )).await;
        });
    }

    async fn reconnect(&mut self) -> AppResult<()> {
        let creds = self.credentials.clone().ok_or_else(|| conn("no room credentials to replay"))?;

        self.set_state(ConnectionState::Disconnecting);
        let mut last = None;
        if let Some(mut old) = self.session.take() {
            last = old.metadata();
            if let Err(e) = old.disconnect().await {
                self.log.error(format!("disconnect failed: {e}")).await;
            }
            debug!(lifecycle = ?old.lifecycle(), "previous session closed");
        }
        self.set_state(ConnectionState::Disconnected);

        time::sleep(self.cfg.reconnect_delay).await;
        self.log.info(format!(
            "after reconnect() {:?}, room metadata: {}",
            self.cfg.reconnect_delay,
            last.as_deref().unwrap_or("null"),
        )).await;

        let mut session = self.new_session();
        session.initialize()?;
        self.session = Some(session);
        self.join_room(creds).await;

        match self.current_state() {
            ConnectionState::Connected => Ok(()),
            _ => Err(conn("could not rejoin room")),
        }
    }

    async fn close(&mut self) {
        if let Some(mut s) = self.session.take() {
            if let Err(e) = s.disconnect().await {
                warn!(error = %e, "disconnect on shutdown failed");
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

async fn create_room(http: &reqwest::Client, cfg: &ClientConfig) -> AppResult<RoomCredentials> {
    http.post(cfg.backend_endpoint("create-room"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(AppErr::Credentials)?
        .json()
        .await
        .map_err(AppErr::Credentials)
}

async fn republish(mut updates: broadcast::Receiver<RoomMetadata>, counter: watch::Sender<i64>) {
    loop {
        match updates.recv().await {
            Ok(m) => { counter.send_replace(m.counter); }
            Err(RecvError::Lagged(n)) => warn!(skipped = n, "counter view lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
