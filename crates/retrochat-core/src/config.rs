use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Candidate codes tried before giving up with `CapacityExhausted`.
    pub code_attempts: u32,
    pub max_username_len: usize,
    pub max_room_name_len: usize,
    pub max_body_len: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            code_attempts: 64,
            max_username_len: 32,
            max_room_name_len: 64,
            max_body_len: 2000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fallback tick when no change notification arrives.
    pub poll_interval: Duration,
    /// Minimum spacing between two store fetches for one viewer.
    pub min_fetch_gap: Duration,
    /// Outbound update buffer per viewer.
    pub buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1500),
            min_fetch_gap: Duration::from_millis(250),
            buffer: 64,
        }
    }
}
