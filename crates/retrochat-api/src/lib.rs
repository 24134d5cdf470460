pub mod error;
pub mod health;
pub mod messages;
pub mod rooms;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};

pub use error::{ApiError, ApiResult};
pub use state::{AppState, AppStateInner};

/// The JSON surface. The viewer stream is mounted by the server next to it.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/rooms", post(rooms::create_room))
        .route("/rooms/{code}", get(rooms::get_room))
        .route("/rooms/{code}/join", post(rooms::join_room))
        .route("/rooms/{code}/leave", post(rooms::leave_room))
        .route("/rooms/{code}/pending", get(rooms::list_pending))
        .route("/rooms/{code}/pending/{username}/approve", post(rooms::approve))
        .route("/rooms/{code}/pending/{username}/reject", post(rooms::reject))
        .route("/rooms/{code}/members/{username}", get(rooms::membership))
        .route(
            "/rooms/{code}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use retrochat_core::{RoomConfig, RoomService, SyncConfig};
    use retrochat_db::Database;

    use super::*;

    fn app() -> Router {
        let service = RoomService::new(Database::open_in_memory().unwrap(), RoomConfig::default());
        router(AppStateInner::new(service, SyncConfig::default()))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn full_room_over_http() {
        let app = app();

        let (status, body) = call(
            &app,
            Method::POST,
            "/rooms",
            Some(json!({"name": "Arcade", "username": "Al"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let code = body["room"]["code"].as_str().unwrap().to_string();
        assert_eq!(code.len(), 5);

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/rooms/{code}/join"),
            Some(json!({"username": "Bo"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (_, body) = call(&app, Method::GET, &format!("/rooms/{code}/pending"), None).await;
        assert_eq!(body["pending"], json!(["Bo"]));

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/rooms/{code}/pending/Bo/approve"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notice"]["body"], "Bo has joined the chatroom");

        let (_, body) = call(&app, Method::GET, &format!("/rooms/{code}/members/Bo"), None).await;
        assert_eq!(body["status"], "member");

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/rooms/{code}/messages"),
            Some(json!({"sender": "Bo", "body": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, body) = call(&app, Method::GET, &format!("/rooms/{code}/messages?after=1"), None).await;
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["body"], "hi");
        assert_eq!(body["cursor"], 2);

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/rooms/{code}/leave"),
            Some(json!({"username": "Al", "is_host": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"]["kind"], "room_closed");

        let (status, body) = call(&app, Method::GET, &format!("/rooms/{code}/messages"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn losing_a_decision_race_is_not_found() {
        let app = app();
        let (_, body) = call(
            &app,
            Method::POST,
            "/rooms",
            Some(json!({"name": "Arcade", "username": "Al"})),
        )
        .await;
        let code = body["room"]["code"].as_str().unwrap().to_string();
        call(
            &app,
            Method::POST,
            &format!("/rooms/{code}/join"),
            Some(json!({"username": "Bo"})),
        )
        .await;

        let (status, body) = call(&app, Method::POST, &format!("/rooms/{code}/pending/Bo/reject"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, body) = call(&app, Method::POST, &format!("/rooms/{code}/pending/Bo/approve"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn errors_map_to_statuses() {
        let app = app();

        let (status, body) = call(
            &app,
            Method::POST,
            "/rooms",
            Some(json!({"name": "", "username": "Al"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_input");

        let (status, _) = call(
            &app,
            Method::POST,
            "/rooms/12345/join",
            Some(json!({"username": "Bo"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call(
            &app,
            Method::POST,
            "/rooms",
            Some(json!({"name": "Arcade", "username": "Al"})),
        )
        .await;
        let code = body["room"]["code"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/rooms/{code}/messages"),
            Some(json!({"sender": "Zed", "body": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/rooms/{code}/join"),
            Some(json!({"username": "al"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn health_reports_live_rooms() {
        let app = app();
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "live_rooms": 0}));
    }
}
