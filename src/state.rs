use std::{
    collections::HashMap,
    sync::{atomic::AtomicI64, Arc},
};
use tokio::sync::{broadcast, RwLock};

pub type Tx = broadcast::Sender<String>;

/* ------------ room hub 房間 ------------ */
pub struct RoomState {
    pub tx:           Tx,                 // metadata 變更廣播
    pub metadata:     String,
    pub participants: Vec<String>,        // identity
}

impl RoomState {
    pub fn new(metadata: String) -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx, metadata, participants: Vec::new() }
    }
}

pub type RoomMap = Arc<RwLock<HashMap<String, RoomState>>>;

/* 已建立的房間數，新房間的 counter 從這裡開始 */
pub type RoomSeq = Arc<AtomicI64>;
