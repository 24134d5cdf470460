use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use retrochat_types::api::{MessagesQuery, MessagesResponse, SendMessageRequest, SendMessageResponse};
use retrochat_types::models::Cursor;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn send_message(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = state
        .service
        .send_message(&code, &req.sender, &req.body)
        .await?;
    Ok((StatusCode::CREATED, Json(SendMessageResponse { message })))
}

/// Messages after `?after=` (exclusive). The returned cursor is what the
/// caller passes next time; it stays put when nothing is new.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<MessagesResponse>> {
    let (messages, cursor) = state
        .service
        .fetch_new_messages(&code, Cursor(query.after), query.limit)
        .await?;
    Ok(Json(MessagesResponse { messages, cursor }))
}
