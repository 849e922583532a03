//! One room connection and its metadata listener.
use tokio::{
    sync::{broadcast::{self, error::RecvError}, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

use super::{log::MessageLog, transport::RoomTransport};
use crate::{
    error::{conn, AppResult},
    model::RoomMetadata,
};

/// Decoded metadata updates, shared by every session of one controller.
pub type MetadataBus = broadcast::Sender<RoomMetadata>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Listening,
    Closed,
}

pub struct RoomSession<T> {
    transport: T,
    lifecycle: Lifecycle,
    listener:  Option<JoinHandle<()>>,
    bus:       MetadataBus,
    log:       MessageLog,
}

impl<T: RoomTransport> RoomSession<T> {
    pub fn new(transport: T, bus: MetadataBus, log: MessageLog) -> Self {
        Self { transport, lifecycle: Lifecycle::Uninitialized, listener: None, bus, log }
    }

    /// Registers the metadata listener. Only the first call registers; each
    /// metadata-changed event is published once.
    pub fn initialize(&mut self) -> AppResult<()> {
        match self.lifecycle {
            Lifecycle::Listening => {
                debug!("metadata listener already registered");
                return Ok(());
            }
            Lifecycle::Closed => return Err(conn("session already closed")),
            Lifecycle::Uninitialized => {}
        }
        let events = self.transport.subscribe();
        self.listener = Some(tokio::spawn(listen(events, self.bus.clone(), self.log.clone())));
        self.lifecycle = Lifecycle::Listening;
        Ok(())
    }

    pub async fn connect(&mut self, url: &str, token: &str) -> AppResult<()> {
        if self.lifecycle == Lifecycle::Closed {
            return Err(conn("session already closed"));
        }
        self.transport.connect(url, token).await
    }

    /// Closing twice is a no-op.
    pub async fn disconnect(&mut self) -> AppResult<()> {
        if self.lifecycle == Lifecycle::Closed {
            return Ok(());
        }
        self.lifecycle = Lifecycle::Closed;
        if let Some(l) = self.listener.take() {
            l.abort();
        }
        self.transport.disconnect().await
    }

    pub fn name(&self) -> Option<String> {
        self.transport.name()
    }

    pub fn metadata(&self) -> Option<String> {
        let rx = self.transport.metadata();
        let current = rx.borrow().clone();
        current
    }

    pub fn metadata_watch(&self) -> watch::Receiver<Option<String>> {
        self.transport.metadata()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }
}

impl<T> Drop for RoomSession<T> {
    fn drop(&mut self) {
        if let Some(l) = self.listener.take() {
            l.abort();
        }
    }
}

async fn listen(mut events: broadcast::Receiver<String>, bus: MetadataBus, log: MessageLog) {
    loop {
        match events.recv().await {
            Ok(raw) => publish(&raw, &bus, &log).await,
            Err(RecvError::Lagged(n)) => warn!(skipped = n, "metadata listener lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn publish(raw: &str, bus: &MetadataBus, log: &MessageLog) {
    log.info(format!("RoomEvent.RoomMetadataChanged: {raw:?}")).await;
    if raw.is_empty() {
        return;
    }
    match RoomMetadata::parse(raw) {
        Ok(m) => { bus.send(m).ok(); }
        Err(e) => log.error(format!("discarding room metadata update: {e}")).await,
    }
}
