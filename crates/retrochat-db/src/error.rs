use retrochat_types::models::RoomCode;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    #[error("no pending request from {username} in room {code}")]
    NoSuchPendingRequest { code: RoomCode, username: String },

    #[error("{username} already has a pending request in room {code}")]
    AlreadyPending { code: RoomCode, username: String },

    #[error("username {username} is already in use in room {code}")]
    UsernameTaken { code: RoomCode, username: String },

    #[error("{username} is not a member of room {code}")]
    NotAMember { code: RoomCode, username: String },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned: {0}")]
    LockPoisoned(String),
}
