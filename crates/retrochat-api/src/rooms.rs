use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use retrochat_types::api::{
    ApproveResponse, CreateRoomRequest, CreateRoomResponse, JoinRoomRequest, JoinRoomResponse,
    LeaveRoomRequest, LeaveRoomResponse, MembershipResponse, PendingUsersResponse, RoomResponse,
};

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> ApiResult<impl IntoResponse> {
    let room = state.service.create_room(&req.name, &req.username).await?;
    Ok((StatusCode::CREATED, Json(CreateRoomResponse { room })))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<RoomResponse>> {
    let snapshot = state.service.room_snapshot(&code).await?;
    Ok(Json(RoomResponse { snapshot }))
}

/// Accepted, not admitted: the caller waits for the host.
pub async fn join_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<JoinRoomRequest>,
) -> ApiResult<impl IntoResponse> {
    let request = state.service.join_room(&code, &req.username).await?;
    Ok((StatusCode::ACCEPTED, Json(JoinRoomResponse { request })))
}

pub async fn list_pending(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<PendingUsersResponse>> {
    let pending = state.service.list_pending_users(&code).await?;
    Ok(Json(PendingUsersResponse { pending }))
}

pub async fn approve(
    State(state): State<AppState>,
    Path((code, username)): Path<(String, String)>,
) -> ApiResult<Json<ApproveResponse>> {
    let notice = state.service.approve_user(&code, &username).await?;
    info!("Approved {} into room {}", username, code);
    Ok(Json(ApproveResponse { notice }))
}

pub async fn reject(
    State(state): State<AppState>,
    Path((code, username)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.service.reject_user(&code, &username).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn membership(
    State(state): State<AppState>,
    Path((code, username)): Path<(String, String)>,
) -> ApiResult<Json<MembershipResponse>> {
    let status = state.service.membership_status(&code, &username).await?;
    Ok(Json(MembershipResponse { status }))
}

pub async fn leave_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<LeaveRoomRequest>,
) -> ApiResult<Json<LeaveRoomResponse>> {
    let outcome = state
        .service
        .leave_room(&code, &req.username, req.is_host)
        .await?;
    Ok(Json(LeaveRoomResponse { outcome }))
}
