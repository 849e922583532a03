use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::{config::ClientConfig, error::AppResult, model::ConnectionState};

pub mod controller;
pub mod log;
pub mod session;
pub mod transport;

use controller::{FolderController, FolderHandle};
use transport::WsTransport;

const CONFIRM_WITHIN: Duration = Duration::from_secs(5);

/// Terminal stand-in for the folder page. Reads one command per line:
/// `+` increment, `r` reconnect, `s` status, `l` message log, `q` quit.
pub async fn run(cfg: ClientConfig, folder: String) -> AppResult<()> {
    let connect_timeout = cfg.connect_timeout;
    let page = FolderController::spawn(cfg, folder, move || WsTransport::new(connect_timeout))?;

    /* counter 畫面 */
    let mut counter = page.counter();
    tokio::spawn(async move {
        while counter.changed().await.is_ok() {
            let n = *counter.borrow_and_update();
            info!(counter = n, "counter");
        }
    });

    match page.wait_for_state(ConnectionState::Connected, connect_timeout).await {
        Ok(()) => info!("ready: + increment, r reconnect, s status, l log, q quit"),
        Err(e) => warn!(error = %e, state = ?page.state(), "room not joined"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if dispatch(&page, &line).await? == Flow::Quit {
            break;
        }
    }
    page.shutdown().await
}

#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Runs one terminal command against the page.
pub async fn dispatch(page: &FolderHandle, line: &str) -> AppResult<Flow> {
    match line.trim() {
        "+" | "i" => increment(page)?,
        "r" => {
            let p = page.clone();
            tokio::spawn(async move {
                if let Err(e) = p.reconnect().await {
                    warn!(error = %e, "reconnect failed");
                }
            });
        }
        "s" => info!(state = ?page.state(), counter = *page.counter().borrow(), "status"),
        "l" => {
            for entry in page.log().entries().await {
                println!("{entry}");
            }
        }
        "q" => return Ok(Flow::Quit),
        "" => {}
        other => warn!(input = other, "unknown command"),
    }
    Ok(Flow::Continue)
}

fn increment(page: &FolderHandle) -> AppResult<()> {
    let expected = *page.counter().borrow() + 1;
    page.increment()?;

    let p = page.clone();
    tokio::spawn(async move {
        if let Err(e) = p.wait_for_counter(expected, CONFIRM_WITHIN).await {
            warn!(error = %e, "increment not observed");
        }
    });
    Ok(())
}
