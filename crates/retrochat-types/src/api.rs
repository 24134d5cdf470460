use serde::{Deserialize, Serialize};

use crate::models::{
    Cursor, LeaveOutcome, MembershipStatus, Message, PendingRequest, Room, RoomSnapshot,
};

// -- Rooms --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    pub name: String,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room: Room,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomResponse {
    pub snapshot: RoomSnapshot,
}

// -- Membership --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinRoomRequest {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRoomResponse {
    pub request: PendingRequest,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingUsersResponse {
    pub pending: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveResponse {
    /// The "has joined" notice appended by the approval.
    pub notice: Message,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MembershipResponse {
    pub status: MembershipStatus,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeaveRoomRequest {
    pub username: String,
    #[serde(default)]
    pub is_host: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaveRoomResponse {
    pub outcome: LeaveOutcome,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub sender: String,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    /// Cursor of the last message already seen; 0 for the whole history.
    #[serde(default)]
    pub after: u64,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
    pub cursor: Cursor,
}

// -- Stream --

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub username: String,
}

// -- Errors / health --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub live_rooms: u64,
}
