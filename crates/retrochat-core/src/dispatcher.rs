use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::trace;

use retrochat_types::events::RoomEvent;
use retrochat_types::models::RoomCode;

const ROOM_CHANNEL_CAPACITY: usize = 64;

/// Fans change notifications out to the viewers watching each room.
///
/// Notifications are wake-up hints: a subscriber that lags or misses one
/// still converges because it re-reads the store on its next tick.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// room code -> broadcast channel for that room
    rooms: RwLock<HashMap<RoomCode, broadcast::Sender<RoomEvent>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events for one room, creating its channel on first use.
    pub async fn subscribe(&self, code: &RoomCode) -> broadcast::Receiver<RoomEvent> {
        if let Some(tx) = self.inner.rooms.read().await.get(code) {
            return tx.subscribe();
        }

        self.inner
            .rooms
            .write()
            .await
            .entry(code.clone())
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver an event to the room's subscribers. Channels nobody listens
    /// to any more, and channels of closed rooms, are dropped.
    pub async fn publish(&self, event: RoomEvent) {
        let code = event.room_code().clone();
        let closing = matches!(event, RoomEvent::RoomClosed { .. });

        let delivered = match self.inner.rooms.read().await.get(&code) {
            Some(tx) => tx.send(event).is_ok(),
            None => return,
        };

        if closing || !delivered {
            trace!("Dropping event channel for room {}", code);
            let mut rooms = self.inner.rooms.write().await;
            if closing || rooms.get(&code).is_some_and(|tx| tx.receiver_count() == 0) {
                rooms.remove(&code);
            }
        }
    }

    /// Number of rooms that currently have a channel.
    pub async fn channel_count(&self) -> usize {
        self.inner.rooms.read().await.len()
    }
}
