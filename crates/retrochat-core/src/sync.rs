use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use retrochat_types::events::{RoomEvent, ViewerEvent};

use crate::config::SyncConfig;
use crate::viewer::Viewer;

/// Keeps one viewer in step with the store until it leaves the room, the
/// consumer goes away, or `cancel` fires.
///
/// Room notifications trigger an early refresh; the poll interval is the
/// fallback when none arrive. Bursts of notifications collapse into a single
/// fetch, and fetches are never closer together than `min_fetch_gap`.
pub async fn run_sync_loop(
    viewer: Arc<Mutex<Viewer>>,
    config: SyncConfig,
    updates: mpsc::Sender<ViewerEvent>,
    cancel: CancellationToken,
) {
    let (service, code) = {
        let v = viewer.lock().await;
        match v.session().room_code() {
            Some(code) if v.session().is_in_room() => (v.service().clone(), code.clone()),
            _ => return,
        }
    };

    let mut rx = service.subscribe(&code).await;
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_fetch: Option<Instant> = None;

    debug!("Sync loop started for room {}", code);

    loop {
        let mut channel_closed = false;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            event = rx.recv() => match event {
                Ok(event) => trace!("Woken by {:?}", event),
                Err(RecvError::Lagged(n)) => trace!("Missed {} room notifications", n),
                Err(RecvError::Closed) => channel_closed = true,
            },
        }

        drain(&mut rx);

        if let Some(last) = last_fetch {
            let since = last.elapsed();
            if since < config.min_fetch_gap {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.min_fetch_gap - since) => {}
                }
                drain(&mut rx);
            }
        }

        let (result, in_room) = {
            let mut v = viewer.lock().await;
            let result = v.refresh().await;
            (result, v.session().is_in_room())
        };
        last_fetch = Some(Instant::now());

        match result {
            Ok(events) => {
                for event in events {
                    if updates.send(event).await.is_err() {
                        debug!("Viewer for room {} went away", code);
                        return;
                    }
                }
            }
            // Transient; the next tick retries from the same cursor
            Err(e) => warn!("Refresh for room {} failed: {}", code, e),
        }

        if !in_room {
            break;
        }
        if channel_closed {
            rx = service.subscribe(&code).await;
        }
        ticker.reset();
    }

    debug!("Sync loop for room {} stopped", code);
}

/// Spawns [`run_sync_loop`] and hands back the receiving end of its updates.
pub fn spawn_sync_loop(
    viewer: Arc<Mutex<Viewer>>,
    config: SyncConfig,
    cancel: CancellationToken,
) -> (mpsc::Receiver<ViewerEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.buffer.max(1));
    let handle = tokio::spawn(run_sync_loop(viewer, config, tx, cancel));
    (rx, handle)
}

fn drain(rx: &mut broadcast::Receiver<RoomEvent>) {
    loop {
        match rx.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}
