use tracing::{debug, info, warn};

use retrochat_types::events::{DepartReason, ViewerEvent};
use retrochat_types::models::{
    LeaveOutcome, MembershipStatus, Message, PendingRequest, Role, Room, RoomCode,
};

use crate::error::{ChatError, ChatResult};
use crate::lifecycle::RoomService;
use crate::session::{SessionState, ViewerSession};

/// One viewer: the shared controller plus this viewer's own session. Every
/// method maps to one row of the lifecycle table.
pub struct Viewer {
    service: RoomService,
    session: ViewerSession,
}

impl Viewer {
    pub fn new(service: RoomService) -> Self {
        Self {
            service,
            session: ViewerSession::new(),
        }
    }

    /// Reattach `username` to `code` after a reconnect. The session is
    /// derived from the store alone; the log is re-read from the start on
    /// the next refresh.
    pub async fn resume(service: RoomService, code: &str, username: &str) -> ChatResult<Self> {
        let status = service.membership_status(code, username).await?;
        let code = RoomCode::parse(code).ok_or_else(|| ChatError::RoomNotFound(code.to_string()))?;

        if status == MembershipStatus::Absent {
            return Err(ChatError::NotAMember {
                code,
                username: username.trim().to_string(),
            });
        }

        let session = ViewerSession::restore(code, username.trim().to_string(), status);
        Ok(Self::with_session(service, session))
    }

    /// Attach an already built session, e.g. one restored by the caller.
    pub fn with_session(service: RoomService, session: ViewerSession) -> Self {
        Self { service, session }
    }

    pub fn session(&self) -> &ViewerSession {
        &self.session
    }

    pub fn service(&self) -> &RoomService {
        &self.service
    }

    /// Anonymous -> Active(host)
    pub async fn create_room(&mut self, name: &str, username: &str) -> ChatResult<Room> {
        self.require_idle("create a room")?;
        let room = self.service.create_room(name, username).await?;
        self.session
            .enter_as_host(room.code.clone(), room.host_username.clone());
        Ok(room)
    }

    /// Anonymous -> PendingApproval. On failure the viewer stays where it was.
    pub async fn join_room(&mut self, code: &str, username: &str) -> ChatResult<PendingRequest> {
        self.require_idle("join a room")?;
        let request = self.service.join_room(code, username).await?;
        self.session
            .await_approval(request.room_code.clone(), request.username.clone());
        Ok(request)
    }

    /// Host only. The local pending list drops the name only on success, so
    /// a failed attempt stays visible for a retry.
    pub async fn approve(&mut self, username: &str) -> ChatResult<Message> {
        let (code, _) = self.require_role(Role::Host, "approve requests")?;
        match self.service.approve_user(code.as_str(), username).await {
            Ok(notice) => {
                self.session.forget_pending(username);
                Ok(notice)
            }
            Err(e) => Err(self.note_room_gone(e)),
        }
    }

    pub async fn reject(&mut self, username: &str) -> ChatResult<()> {
        let (code, _) = self.require_role(Role::Host, "reject requests")?;
        match self.service.reject_user(code.as_str(), username).await {
            Ok(()) => {
                self.session.forget_pending(username);
                Ok(())
            }
            Err(e) => Err(self.note_room_gone(e)),
        }
    }

    /// Sends a chat line. The message reaches the local buffer through the
    /// next refresh like everyone else's, keeping one ordering.
    pub async fn send(&mut self, body: &str) -> ChatResult<Message> {
        let (code, username) = self.require_active("send messages")?;
        self.service
            .send_message(code.as_str(), &username, body)
            .await
            .map_err(|e| self.note_room_gone(e))
    }

    /// One reconciliation round against the store. Returns what changed,
    /// ready to be rendered or forwarded.
    pub async fn refresh(&mut self) -> ChatResult<Vec<ViewerEvent>> {
        let mut events = Vec::new();

        match self.session.state().clone() {
            SessionState::Anonymous | SessionState::Departed { .. } => return Ok(events),

            SessionState::PendingApproval { code, username } => {
                match self.service.membership_status(code.as_str(), &username).await {
                    Ok(MembershipStatus::Member) => {
                        info!("{} was admitted to room {}", username, code);
                        self.session.admit();
                        events.push(ViewerEvent::Approved {
                            room_code: code.clone(),
                        });
                    }
                    Ok(MembershipStatus::Pending) => return Ok(events),
                    Ok(MembershipStatus::Absent | MembershipStatus::Host) => {
                        debug!("{} was turned away from room {}", username, code);
                        self.session.turn_away();
                        events.push(ViewerEvent::Rejected { room_code: code });
                        return Ok(events);
                    }
                    Err(e) if e.is_room_gone() => {
                        events.push(self.room_closed(code));
                        return Ok(events);
                    }
                    Err(e) => return Err(e),
                }
            }

            // A guest can be removed from elsewhere, e.g. a leave over HTTP
            SessionState::Active {
                code,
                username,
                role: Role::Guest,
            } => match self.service.membership_status(code.as_str(), &username).await {
                Ok(MembershipStatus::Member) => {}
                Ok(_) => {
                    info!("{} is no longer in room {}, detaching viewer", username, code);
                    self.session.depart(DepartReason::Left);
                    events.push(ViewerEvent::Departed {
                        room_code: code,
                        reason: DepartReason::Left,
                    });
                    return Ok(events);
                }
                Err(e) if e.is_room_gone() => {
                    events.push(self.room_closed(code));
                    return Ok(events);
                }
                Err(e) => return Err(e),
            },

            SessionState::Active { .. } => {}
        }

        let Some(code) = self.session.room_code().cloned() else {
            return Ok(events);
        };

        if self.session.is_host() {
            match self.service.list_pending_users(code.as_str()).await {
                Ok(pending) => {
                    if self.session.replace_pending(pending.clone()) {
                        events.push(ViewerEvent::PendingUsers { usernames: pending });
                    }
                }
                Err(e) if e.is_room_gone() => {
                    events.push(self.room_closed(code));
                    return Ok(events);
                }
                Err(e) => return Err(e),
            }
        }

        match self
            .service
            .fetch_new_messages(code.as_str(), self.session.cursor(), None)
            .await
        {
            Ok((messages, _)) => {
                if self.session.absorb(&messages) > 0 {
                    events.push(ViewerEvent::Messages {
                        messages,
                        cursor: self.session.cursor(),
                    });
                }
            }
            Err(e) if e.is_room_gone() => events.push(self.room_closed(code)),
            Err(e) => return Err(e),
        }

        Ok(events)
    }

    /// Leave whatever room this viewer is in. The local session is reset no
    /// matter what the store says; a store failure is still returned.
    pub async fn leave(&mut self) -> ChatResult<LeaveOutcome> {
        let result = match self.session.state().clone() {
            SessionState::Active {
                code,
                username,
                role,
            } => {
                self.service
                    .leave_room(code.as_str(), &username, role == Role::Host)
                    .await
            }
            SessionState::PendingApproval { code, username } => {
                self.service.leave_room(code.as_str(), &username, false).await
            }
            SessionState::Anonymous | SessionState::Departed { .. } => Ok(LeaveOutcome::NotInRoom),
        };

        self.session.depart(DepartReason::Left);

        if let Err(e) = &result {
            warn!("Leave did not complete remotely: {}", e);
        }
        result
    }

    fn room_closed(&mut self, code: RoomCode) -> ViewerEvent {
        info!("Room {} is gone, detaching viewer", code);
        self.session.depart(DepartReason::RoomClosed);
        ViewerEvent::Departed {
            room_code: code,
            reason: DepartReason::RoomClosed,
        }
    }

    /// A failed action that revealed the room is gone also ends the session.
    fn note_room_gone(&mut self, e: ChatError) -> ChatError {
        if e.is_room_gone() {
            self.session.depart(DepartReason::RoomClosed);
        }
        e
    }

    fn require_idle(&self, action: &'static str) -> ChatResult<()> {
        if self.session.is_idle() {
            Ok(())
        } else {
            Err(ChatError::WrongState {
                action,
                state: self.session.state().label(),
            })
        }
    }

    fn require_active(&self, action: &'static str) -> ChatResult<(RoomCode, String)> {
        match self.session.state() {
            SessionState::Active { code, username, .. } => Ok((code.clone(), username.clone())),
            other => Err(ChatError::WrongState {
                action,
                state: other.label(),
            }),
        }
    }

    fn require_role(&self, role: Role, action: &'static str) -> ChatResult<(RoomCode, String)> {
        match self.session.state() {
            SessionState::Active {
                code,
                username,
                role: r,
            } if *r == role => Ok((code.clone(), username.clone())),
            other => Err(ChatError::WrongState {
                action,
                state: other.label(),
            }),
        }
    }
}
