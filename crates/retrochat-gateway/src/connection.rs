use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use retrochat_core::sync::run_sync_loop;
use retrochat_core::{ChatError, RoomService, SyncConfig, Viewer};
use retrochat_types::events::{DepartReason, ViewerCommand, ViewerEvent};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Runs one viewer over a WebSocket.
///
/// The viewer is rebuilt from the store, so a reconnect picks up where the
/// store says the user stands. Dropping the socket does not leave the room;
/// only an explicit `Leave` does.
pub async fn handle_viewer(
    socket: WebSocket,
    service: RoomService,
    sync: SyncConfig,
    code: String,
    username: String,
) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    let viewer = match Viewer::resume(service, &code, &username).await {
        Ok(viewer) => viewer,
        Err(e) => {
            info!("[{}] {} refused on room {}: {}", conn_id, username, code, e);
            send_event(&mut sender, &error_event(&e)).await;
            let _ = sender.close().await;
            return;
        }
    };

    let ready = match (viewer.session().room_code(), viewer.session().username()) {
        (Some(room_code), Some(name)) => ViewerEvent::Ready {
            room_code: room_code.clone(),
            username: name.to_string(),
            role: viewer.session().role(),
        },
        _ => return,
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    info!("[{}] {} attached to room {} ({})", conn_id, username, code, viewer.session().state().label());

    let viewer = Arc::new(Mutex::new(viewer));
    let cancel = CancellationToken::new();
    let (updates_tx, mut updates_rx) = mpsc::channel(sync.buffer.max(1));

    let sync_task = tokio::spawn(run_sync_loop(
        viewer.clone(),
        sync,
        updates_tx.clone(),
        cancel.clone(),
    ));

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward updates -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                update = updates_rx.recv() => {
                    let Some(event) = update else { break };
                    let finished = ends_stream(&event);
                    if !send_event(&mut sender, &event).await || finished {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("[{}] Heartbeat timeout (missed {} pongs), dropping connection", conn_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    // Read commands from client
    let recv_viewer = viewer.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ViewerCommand>(&text) {
                    Ok(cmd) => {
                        for event in handle_command(&recv_viewer, cmd).await {
                            if updates_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(
                            "[{}] bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        let event = ViewerEvent::Error {
                            kind: "invalid_input".into(),
                            message: format!("unreadable command: {e}"),
                        };
                        if updates_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    cancel.cancel();
    if let Err(e) = sync_task.await {
        warn!("[{}] sync task ended abnormally: {}", conn_id, e);
    }

    let still_in_room = viewer.lock().await.session().is_in_room();
    info!(
        "[{}] {} detached from room {}{}",
        conn_id,
        username,
        code,
        if still_in_room { " (membership kept)" } else { "" }
    );
}

/// Applies one command to the viewer and returns the frames to send back.
async fn handle_command(viewer: &Mutex<Viewer>, cmd: ViewerCommand) -> Vec<ViewerEvent> {
    let mut v = viewer.lock().await;

    let result = match cmd {
        ViewerCommand::Send { body } => v.send(&body).await.map(|_| None),
        ViewerCommand::Approve { username } => v.approve(&username).await.map(|_| {
            Some(ViewerEvent::PendingUsers {
                usernames: v.session().pending_users().to_vec(),
            })
        }),
        ViewerCommand::Reject { username } => v.reject(&username).await.map(|_| {
            Some(ViewerEvent::PendingUsers {
                usernames: v.session().pending_users().to_vec(),
            })
        }),
        ViewerCommand::Leave => {
            let code = v.session().room_code().cloned();
            // Local state is reset even when the store call fails
            let mut events = Vec::new();
            if let Err(e) = v.leave().await {
                events.push(error_event(&e));
            }
            if let Some(room_code) = code {
                events.push(ViewerEvent::Departed {
                    room_code,
                    reason: DepartReason::Left,
                });
            }
            return events;
        }
    };

    match result {
        Ok(reply) => reply.into_iter().collect(),
        Err(e) if e.is_room_gone() && !v.session().is_in_room() => {
            let mut events = vec![error_event(&e)];
            if let Some(room_code) = v.session().room_code().cloned() {
                events.push(ViewerEvent::Departed {
                    room_code,
                    reason: DepartReason::RoomClosed,
                });
            }
            events
        }
        Err(e) => vec![error_event(&e)],
    }
}

/// Frames after which nothing more will arrive: the viewer is out of the room.
fn ends_stream(event: &ViewerEvent) -> bool {
    matches!(
        event,
        ViewerEvent::Departed { .. } | ViewerEvent::Rejected { .. }
    )
}

fn error_event(e: &ChatError) -> ViewerEvent {
    ViewerEvent::Error {
        kind: e.kind().as_str().to_string(),
        message: e.to_string(),
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &ViewerEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode viewer event: {}", e);
            true
        }
    }
}
