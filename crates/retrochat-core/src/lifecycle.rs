use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use retrochat_db::{Database, StoreError, StoreResult};
use retrochat_types::events::RoomEvent;
use retrochat_types::models::{
    Cursor, LeaveOutcome, MembershipStatus, Message, PendingRequest, Room, RoomCode, RoomSnapshot,
    SYSTEM_SENDER, left_notice,
};

use crate::codes::{CodeSource, RandomCodes};
use crate::config::RoomConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ChatError, ChatResult};

/// The room lifecycle controller. Stateless apart from the store handle, so
/// one instance is shared by every viewer; all coordination between viewers
/// happens in the store.
#[derive(Clone)]
pub struct RoomService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    codes: Box<dyn CodeSource>,
    config: RoomConfig,
}

impl RoomService {
    pub fn new(db: Database, config: RoomConfig) -> Self {
        Self::with_code_source(db, config, RandomCodes)
    }

    pub fn with_code_source(
        db: Database,
        config: RoomConfig,
        codes: impl CodeSource + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                db: Arc::new(db),
                dispatcher: Dispatcher::new(),
                codes: Box::new(codes),
                config,
            }),
        }
    }

    /// Change notifications for one room.
    pub async fn subscribe(&self, code: &RoomCode) -> broadcast::Receiver<RoomEvent> {
        self.inner.dispatcher.subscribe(code).await
    }

    /// Run a blocking store call off the async runtime.
    async fn store<F, T>(&self, f: F) -> ChatResult<T>
    where
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.inner.db.clone();
        Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
    }

    async fn publish(&self, event: RoomEvent) {
        self.inner.dispatcher.publish(event).await;
    }

    // -- Operations --

    /// Creates a room hosted by `username` under a fresh code. The host is
    /// in the room immediately; no notice is written.
    pub async fn create_room(&self, name: &str, username: &str) -> ChatResult<Room> {
        let name = self.check_room_name(name)?;
        let host = self.check_username(username)?;
        let attempts = self.inner.config.code_attempts;

        let inner = self.inner.clone();
        let room = tokio::task::spawn_blocking(move || -> ChatResult<Room> {
            for attempt in 1..=attempts {
                let code = inner.codes.candidate();
                if let Some(room) = inner.db.insert_room(&code, &name, &host)? {
                    if attempt > 1 {
                        debug!("Room code {} found on attempt {}", code, attempt);
                    }
                    return Ok(room);
                }
            }
            Err(ChatError::CapacityExhausted { attempts })
        })
        .await??;

        info!("{} created room {} ({})", room.host_username, room.code, room.name);
        Ok(room)
    }

    /// Queues a request to enter. Grants nothing until the host approves.
    pub async fn join_room(&self, code: &str, username: &str) -> ChatResult<PendingRequest> {
        let code = parse_code(code)?;
        let username = self.check_username(username)?;

        let c = code.clone();
        let request = self.store(move |db| db.insert_pending(&c, &username)).await?;

        info!("{} asked to join room {}", request.username, code);
        self.publish(RoomEvent::PendingChanged { code }).await;
        Ok(request)
    }

    /// Waiting usernames, oldest first. Side-effect free.
    pub async fn list_pending_users(&self, code: &str) -> ChatResult<Vec<String>> {
        let code = parse_code(code)?;
        self.store(move |db| db.list_pending(&code)).await
    }

    /// Admits a waiting user and returns the "has joined" notice.
    pub async fn approve_user(&self, code: &str, username: &str) -> ChatResult<Message> {
        let code = parse_code(code)?;
        let username = username.trim().to_string();

        let c = code.clone();
        let notice = self.store(move |db| db.approve_pending(&c, &username)).await?;

        self.publish(RoomEvent::PendingChanged { code: code.clone() }).await;
        self.publish(RoomEvent::MessageAppended {
            code,
            seq: notice.seq,
        })
        .await;
        Ok(notice)
    }

    /// Turns a waiting user away. Nothing is written to the log.
    pub async fn reject_user(&self, code: &str, username: &str) -> ChatResult<()> {
        let code = parse_code(code)?;
        let username = username.trim().to_string();

        let c = code.clone();
        self.store(move |db| db.reject_pending(&c, &username)).await?;

        self.publish(RoomEvent::PendingChanged { code }).await;
        Ok(())
    }

    /// Appends a chat line. Fails with `RoomNotFound` once the host has
    /// left, which callers should treat as the room ending, not a crash.
    pub async fn send_message(&self, code: &str, sender: &str, body: &str) -> ChatResult<Message> {
        let code = parse_code(code)?;
        let sender = sender.trim().to_string();
        let body = self.check_body(body)?;

        let c = code.clone();
        let message = self.store(move |db| db.post_message(&c, &sender, &body)).await?;

        self.publish(RoomEvent::MessageAppended {
            code,
            seq: message.seq,
        })
        .await;
        Ok(message)
    }

    /// Messages after `cursor` and the cursor to use next time. The cursor
    /// only moves when something new came back.
    pub async fn fetch_new_messages(
        &self,
        code: &str,
        cursor: Cursor,
        limit: Option<u32>,
    ) -> ChatResult<(Vec<Message>, Cursor)> {
        let code = parse_code(code)?;
        let messages = self
            .store(move |db| db.messages_since(&code, cursor, limit))
            .await?;

        let next = messages.last().map(Message::cursor).unwrap_or(cursor);
        Ok((messages, next))
    }

    pub async fn is_member(&self, code: &str, username: &str) -> ChatResult<bool> {
        let code = parse_code(code)?;
        let username = username.trim().to_string();
        self.store(move |db| db.is_member(&code, &username)).await
    }

    pub async fn membership_status(&self, code: &str, username: &str) -> ChatResult<MembershipStatus> {
        let code = parse_code(code)?;
        let username = username.trim().to_string();
        self.store(move |db| db.membership_status(&code, &username))
            .await
    }

    pub async fn room_snapshot(&self, code: &str) -> ChatResult<RoomSnapshot> {
        let code = parse_code(code)?;
        self.store(move |db| db.room_snapshot(&code)).await
    }

    /// Takes `username` out of the room.
    ///
    /// * host: the farewell notice is written and the room, its requests,
    ///   members and log are deleted in one transaction;
    /// * member: the member row goes and a "has left" notice is appended;
    /// * waiting guest: the pending request is withdrawn.
    ///
    /// A room that is already gone counts as left. Only the real host may
    /// close a room.
    pub async fn leave_room(&self, code: &str, username: &str, is_host: bool) -> ChatResult<LeaveOutcome> {
        let code = match RoomCode::parse(code) {
            Some(code) => code,
            None => return Ok(LeaveOutcome::NotInRoom),
        };
        let username = username.trim().to_string();

        let outcome = if is_host {
            self.close_room(code.clone(), username).await?
        } else {
            self.guest_leave(code.clone(), username).await?
        };

        match &outcome {
            LeaveOutcome::RoomClosed { .. } => {
                self.publish(RoomEvent::RoomClosed { code }).await;
            }
            LeaveOutcome::MemberLeft { farewell } => {
                self.publish(RoomEvent::MessageAppended {
                    code,
                    seq: farewell.seq,
                })
                .await;
            }
            LeaveOutcome::RequestCancelled => {
                self.publish(RoomEvent::PendingChanged { code }).await;
            }
            LeaveOutcome::NotInRoom => {}
        }
        Ok(outcome)
    }

    async fn close_room(&self, code: RoomCode, username: String) -> ChatResult<LeaveOutcome> {
        let attempt = self
            .store(move |db| {
                let Some(room) = db.get_room(&code)? else {
                    return Ok(CloseAttempt::Gone);
                };
                if !room.host_username.eq_ignore_ascii_case(&username) {
                    return Ok(CloseAttempt::NotHost(code, username));
                }
                match db.close_room(&code, &left_notice(&room.host_username)) {
                    Ok(farewell) => Ok(CloseAttempt::Closed(farewell)),
                    Err(StoreError::RoomNotFound(_)) => Ok(CloseAttempt::Gone),
                    Err(e) => Err(e),
                }
            })
            .await?;

        match attempt {
            CloseAttempt::Closed(farewell) => Ok(LeaveOutcome::RoomClosed { farewell }),
            CloseAttempt::Gone => Ok(LeaveOutcome::NotInRoom),
            CloseAttempt::NotHost(code, username) => Err(ChatError::NotHost { code, username }),
        }
    }

    async fn guest_leave(&self, code: RoomCode, username: String) -> ChatResult<LeaveOutcome> {
        self.store(move |db| {
            let removed = match db.remove_member(&code, &username) {
                Ok(removed) => removed,
                Err(StoreError::RoomNotFound(_)) => return Ok(LeaveOutcome::NotInRoom),
                Err(e) => return Err(e),
            };
            if let Some(farewell) = removed {
                return Ok(LeaveOutcome::MemberLeft { farewell });
            }

            match db.reject_pending(&code, &username) {
                Ok(()) => Ok(LeaveOutcome::RequestCancelled),
                Err(StoreError::NoSuchPendingRequest { .. } | StoreError::RoomNotFound(_)) => {
                    Ok(LeaveOutcome::NotInRoom)
                }
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Reconciliation pass for rows whose room vanished.
    pub async fn sweep_orphans(&self) -> ChatResult<usize> {
        let removed = self.store(|db| db.sweep_orphans()).await?;
        if removed > 0 {
            warn!("Swept {} orphaned rows", removed);
        }
        Ok(removed)
    }

    pub async fn live_rooms(&self) -> ChatResult<u64> {
        self.store(|db| db.count_rooms()).await
    }

    // -- Input checks --

    fn check_username(&self, raw: &str) -> ChatResult<String> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(ChatError::invalid("username", "must not be empty"));
        }
        if name.chars().count() > self.inner.config.max_username_len {
            return Err(ChatError::invalid(
                "username",
                format!("longer than {} characters", self.inner.config.max_username_len),
            ));
        }
        if name.chars().any(char::is_control) {
            return Err(ChatError::invalid("username", "contains control characters"));
        }
        if name.eq_ignore_ascii_case(SYSTEM_SENDER) {
            return Err(ChatError::invalid("username", "reserved"));
        }
        Ok(name.to_string())
    }

    fn check_room_name(&self, raw: &str) -> ChatResult<String> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(ChatError::invalid("room name", "must not be empty"));
        }
        if name.chars().count() > self.inner.config.max_room_name_len {
            return Err(ChatError::invalid(
                "room name",
                format!("longer than {} characters", self.inner.config.max_room_name_len),
            ));
        }
        Ok(name.to_string())
    }

    fn check_body(&self, raw: &str) -> ChatResult<String> {
        if raw.trim().is_empty() {
            return Err(ChatError::invalid("message", "must not be empty"));
        }
        if raw.chars().count() > self.inner.config.max_body_len {
            return Err(ChatError::invalid(
                "message",
                format!("longer than {} characters", self.inner.config.max_body_len),
            ));
        }
        Ok(raw.to_string())
    }
}

enum CloseAttempt {
    Closed(Message),
    NotHost(RoomCode, String),
    Gone,
}

/// A malformed code can never name a live room, so it is reported the same
/// way as an unknown one.
fn parse_code(raw: &str) -> ChatResult<RoomCode> {
    RoomCode::parse(raw).ok_or_else(|| ChatError::RoomNotFound(raw.trim().to_string()))
}
