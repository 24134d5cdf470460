use retrochat_db::StoreError;
use retrochat_types::models::RoomCode;

pub type ChatResult<T> = Result<T, ChatError>;

/// Coarse classification of a failure, for callers that only need to pick a
/// status code or a message style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    InvalidInput,
    CapacityExhausted,
    BackingStoreUnavailable,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::InvalidInput => "invalid_input",
            Self::CapacityExhausted => "capacity_exhausted",
            Self::BackingStoreUnavailable => "backing_store_unavailable",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Carries the code as the caller gave it, which may not even be well formed.
    #[error("room {0} not found")]
    RoomNotFound(String),

    #[error("no pending request from {username} in room {code}")]
    NoSuchPendingRequest { code: RoomCode, username: String },

    #[error("{username} already has a pending request in room {code}")]
    AlreadyPending { code: RoomCode, username: String },

    #[error("username {username} is already in use in room {code}")]
    UsernameTaken { code: RoomCode, username: String },

    #[error("{username} is not a member of room {code}")]
    NotAMember { code: RoomCode, username: String },

    #[error("{username} is not the host of room {code}")]
    NotHost { code: RoomCode, username: String },

    #[error("cannot {action} while {state}")]
    WrongState {
        action: &'static str,
        state: &'static str,
    },

    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("no free room code after {attempts} attempts")]
    CapacityExhausted { attempts: u32 },

    #[error("backing store unavailable: {0}")]
    BackingStoreUnavailable(String),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RoomNotFound(_) | Self::NoSuchPendingRequest { .. } => ErrorKind::NotFound,
            Self::AlreadyPending { .. } | Self::UsernameTaken { .. } | Self::WrongState { .. } => {
                ErrorKind::Conflict
            }
            Self::NotAMember { .. } | Self::NotHost { .. } => ErrorKind::Forbidden,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::CapacityExhausted { .. } => ErrorKind::CapacityExhausted,
            Self::BackingStoreUnavailable(_) => ErrorKind::BackingStoreUnavailable,
        }
    }

    /// The room this error refers to has been torn down.
    pub fn is_room_gone(&self) -> bool {
        matches!(self, Self::RoomNotFound(_))
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RoomNotFound(code) => Self::RoomNotFound(code.to_string()),
            StoreError::NoSuchPendingRequest { code, username } => {
                Self::NoSuchPendingRequest { code, username }
            }
            StoreError::AlreadyPending { code, username } => Self::AlreadyPending { code, username },
            StoreError::UsernameTaken { code, username } => Self::UsernameTaken { code, username },
            StoreError::NotAMember { code, username } => Self::NotAMember { code, username },
            StoreError::Sqlite(e) => Self::BackingStoreUnavailable(e.to_string()),
            StoreError::LockPoisoned(msg) => Self::BackingStoreUnavailable(msg),
        }
    }
}

impl From<tokio::task::JoinError> for ChatError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::BackingStoreUnavailable(format!("store task failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_meaning() {
        let code = RoomCode::from_number(12);
        let lost_race: ChatError = StoreError::NoSuchPendingRequest {
            code: code.clone(),
            username: "Bo".into(),
        }
        .into();
        assert_eq!(lost_race.kind(), ErrorKind::NotFound);

        let gone: ChatError = StoreError::RoomNotFound(code).into();
        assert!(gone.is_room_gone());
        assert_eq!(gone.to_string(), "room 00012 not found");

        let db: ChatError = StoreError::LockPoisoned("boom".into()).into();
        assert_eq!(db.kind(), ErrorKind::BackingStoreUnavailable);
    }
}
