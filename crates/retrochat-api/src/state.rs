use std::sync::Arc;

use retrochat_core::{RoomService, SyncConfig};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub service: RoomService,
    /// Used by the viewer stream; the HTTP handlers never poll.
    pub sync: SyncConfig,
}

impl AppStateInner {
    pub fn new(service: RoomService, sync: SyncConfig) -> AppState {
        Arc::new(Self { service, sync })
    }
}
