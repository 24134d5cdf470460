use axum::{Json, extract::State};

use retrochat_types::api::HealthResponse;

use crate::error::ApiResult;
use crate::state::AppState;

/// Succeeds only if the store answers a query.
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let live_rooms = state.service.live_rooms().await?;
    Ok(Json(HealthResponse {
        status: "ok".into(),
        live_rooms,
    }))
}
