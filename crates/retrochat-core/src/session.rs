use retrochat_types::events::DepartReason;
use retrochat_types::models::{Cursor, MembershipStatus, Message, Role, RoomCode};

/// Where one viewer stands relative to a room.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    PendingApproval {
        code: RoomCode,
        username: String,
    },
    Active {
        code: RoomCode,
        username: String,
        role: Role,
    },
    Departed {
        code: RoomCode,
        username: String,
        reason: DepartReason,
    },
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Anonymous => "not in a room",
            Self::PendingApproval { .. } => "waiting for approval",
            Self::Active { role: Role::Host, .. } => "hosting",
            Self::Active { role: Role::Guest, .. } => "in a room",
            Self::Departed { .. } => "departed",
        }
    }
}

/// Local view of one connected viewer. Owned by that viewer's connection
/// and never shared; everything in it can be rebuilt from the store.
#[derive(Debug, Default)]
pub struct ViewerSession {
    state: SessionState,
    cursor: Cursor,
    messages: Vec<Message>,
    pending: Vec<String>,
}

impl ViewerSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a session after a reconnect from what the store says about
    /// `username`. The message buffer starts empty at `Cursor::START`.
    pub fn restore(code: RoomCode, username: String, status: MembershipStatus) -> Self {
        let state = match status {
            MembershipStatus::Host => SessionState::Active {
                code,
                username,
                role: Role::Host,
            },
            MembershipStatus::Member => SessionState::Active {
                code,
                username,
                role: Role::Guest,
            },
            MembershipStatus::Pending => SessionState::PendingApproval { code, username },
            MembershipStatus::Absent => SessionState::Anonymous,
        };
        Self {
            state,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending_users(&self) -> &[String] {
        &self.pending
    }

    pub fn room_code(&self) -> Option<&RoomCode> {
        match &self.state {
            SessionState::PendingApproval { code, .. }
            | SessionState::Active { code, .. }
            | SessionState::Departed { code, .. } => Some(code),
            SessionState::Anonymous => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match &self.state {
            SessionState::PendingApproval { username, .. }
            | SessionState::Active { username, .. }
            | SessionState::Departed { username, .. } => Some(username),
            SessionState::Anonymous => None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        match &self.state {
            SessionState::Active { role, .. } => Some(*role),
            _ => None,
        }
    }

    pub fn is_host(&self) -> bool {
        self.role() == Some(Role::Host)
    }

    /// Waiting for approval or inside a room.
    pub fn is_in_room(&self) -> bool {
        matches!(
            self.state,
            SessionState::PendingApproval { .. } | SessionState::Active { .. }
        )
    }

    /// Free to create or join a room.
    pub fn is_idle(&self) -> bool {
        matches!(
            self.state,
            SessionState::Anonymous | SessionState::Departed { .. }
        )
    }

    // -- Transitions --

    pub(crate) fn enter_as_host(&mut self, code: RoomCode, username: String) {
        self.clear();
        self.state = SessionState::Active {
            code,
            username,
            role: Role::Host,
        };
    }

    pub(crate) fn await_approval(&mut self, code: RoomCode, username: String) {
        self.clear();
        self.state = SessionState::PendingApproval { code, username };
    }

    /// PendingApproval -> Active(guest). Returns false from any other state.
    pub(crate) fn admit(&mut self) -> bool {
        match std::mem::take(&mut self.state) {
            SessionState::PendingApproval { code, username } => {
                self.state = SessionState::Active {
                    code,
                    username,
                    role: Role::Guest,
                };
                true
            }
            other => {
                self.state = other;
                false
            }
        }
    }

    /// PendingApproval -> Anonymous after the host said no.
    pub(crate) fn turn_away(&mut self) {
        self.reset();
    }

    /// Leave the room locally. Always succeeds, whatever the store did.
    pub(crate) fn depart(&mut self, reason: DepartReason) {
        let state = match std::mem::take(&mut self.state) {
            SessionState::PendingApproval { code, username }
            | SessionState::Active { code, username, .. } => SessionState::Departed {
                code,
                username,
                reason,
            },
            other => other,
        };
        self.clear();
        self.state = state;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Appends messages newer than the cursor and advances it. Anything at
    /// or below the cursor was seen already and is skipped. Returns how many
    /// were new.
    pub(crate) fn absorb(&mut self, messages: &[Message]) -> usize {
        let before = self.messages.len();
        for message in messages {
            if message.cursor() > self.cursor {
                self.cursor = message.cursor();
                self.messages.push(message.clone());
            }
        }
        self.messages.len() - before
    }

    /// Replaces the rendered pending list. Returns true if it changed.
    pub(crate) fn replace_pending(&mut self, pending: Vec<String>) -> bool {
        if self.pending == pending {
            return false;
        }
        self.pending = pending;
        true
    }

    pub(crate) fn forget_pending(&mut self, username: &str) {
        self.pending.retain(|p| !p.eq_ignore_ascii_case(username));
    }

    fn clear(&mut self) {
        self.cursor = Cursor::START;
        self.messages.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(seq: u64) -> Message {
        Message {
            room_code: RoomCode::from_number(1),
            seq,
            sender: "Al".into(),
            body: format!("#{seq}"),
            is_system: false,
            sent_at: Utc::now(),
        }
    }

    #[test]
    fn guest_walks_the_happy_path() {
        let mut s = ViewerSession::new();
        assert!(s.is_idle());

        s.await_approval(RoomCode::from_number(1), "Bo".into());
        assert!(s.is_in_room());
        assert_eq!(s.role(), None);

        assert!(s.admit());
        assert_eq!(s.role(), Some(Role::Guest));
        assert!(!s.admit());

        s.depart(DepartReason::Left);
        assert!(matches!(
            s.state(),
            SessionState::Departed {
                reason: DepartReason::Left,
                ..
            }
        ));
        assert!(s.is_idle());
        assert_eq!(s.username(), Some("Bo"));
    }

    #[test]
    fn rejection_returns_to_anonymous() {
        let mut s = ViewerSession::new();
        s.await_approval(RoomCode::from_number(1), "Bo".into());
        s.turn_away();
        assert_eq!(s.state(), &SessionState::Anonymous);
    }

    #[test]
    fn absorb_skips_what_was_seen() {
        let mut s = ViewerSession::new();
        s.enter_as_host(RoomCode::from_number(1), "Al".into());

        assert_eq!(s.absorb(&[msg(1), msg(2)]), 2);
        assert_eq!(s.absorb(&[msg(2), msg(3)]), 1);
        assert_eq!(s.absorb(&[]), 0);
        assert_eq!(s.cursor(), Cursor(3));
        let seqs: Vec<u64> = s.messages().iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn depart_clears_local_buffers() {
        let mut s = ViewerSession::new();
        s.enter_as_host(RoomCode::from_number(1), "Al".into());
        s.absorb(&[msg(1)]);
        s.replace_pending(vec!["Bo".into()]);

        s.depart(DepartReason::RoomClosed);
        assert!(s.messages().is_empty());
        assert!(s.pending_users().is_empty());
        assert_eq!(s.cursor(), Cursor::START);
    }

    #[test]
    fn pending_diff_reports_changes_only() {
        let mut s = ViewerSession::new();
        assert!(s.replace_pending(vec!["Bo".into()]));
        assert!(!s.replace_pending(vec!["Bo".into()]));
        s.forget_pending("bo");
        assert!(s.pending_users().is_empty());
    }

    #[test]
    fn restore_maps_membership() {
        let code = RoomCode::from_number(9);
        let host = ViewerSession::restore(code.clone(), "Al".into(), MembershipStatus::Host);
        assert!(host.is_host());
        let waiting = ViewerSession::restore(code.clone(), "Bo".into(), MembershipStatus::Pending);
        assert!(matches!(waiting.state(), SessionState::PendingApproval { .. }));
        let stranger = ViewerSession::restore(code, "Cy".into(), MembershipStatus::Absent);
        assert!(stranger.is_idle());
    }
}
