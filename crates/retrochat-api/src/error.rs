use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use retrochat_core::{ChatError, ErrorKind};
use retrochat_types::api::ErrorBody;

/// Wraps a `ChatError` so handlers can use `?` and still answer with a
/// status code and a JSON body.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        Self(e)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::CapacityExhausted | ErrorKind::BackingStoreUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        match kind {
            ErrorKind::BackingStoreUnavailable => error!("Request failed: {}", self.0),
            ErrorKind::CapacityExhausted => warn!("Request failed: {}", self.0),
            _ => {}
        }

        let body = ErrorBody {
            error: kind.as_str().to_string(),
            message: self.0.to_string(),
        };
        (status_for(kind), Json(body)).into_response()
    }
}
