//! HTTP server setup with Axum

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use super::sse::handler::{
    close_stream_handler, create_session_handler, create_stream_handler, delete_session_handler,
    publish_event_handler, server_info_handler, set_mode_handler, stream_events_handler,
};
use super::sse::SseState;

/// Create the Axum router with all endpoints
pub fn create_router(state: Arc<SseState>) -> Router {
    // CORS configuration - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info_handler))
        .route("/sessions", post(create_session_handler))
        .route("/sessions/:session_id", axum::routing::delete(delete_session_handler))
        .route("/sessions/:session_id/streams", post(create_stream_handler))
        .route("/sessions/:session_id/streams/:stream_id", get(stream_events_handler))
        .route(
            "/sessions/:session_id/streams/:stream_id/events",
            post(publish_event_handler),
        )
        .route("/sessions/:session_id/streams/:stream_id/mode", put(set_mode_handler))
        .route(
            "/sessions/:session_id/streams/:stream_id/close",
            post(close_stream_handler),
        )
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStreamStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    fn test_app() -> Router {
        let store = Arc::new(InMemoryEventStreamStore::new());
        create_router(Arc::new(SseState::new(store)))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn start_session(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(Request::builder().method("POST").uri("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_polling_stream_round_trip() {
        let app = test_app();
        let session_id = start_session(&app).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{}/streams", session_id),
                json!({"stream_id": "main", "mode": "polling"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        for n in 1..=2 {
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    &format!("/sessions/{}/streams/main/events", session_id),
                    json!({"data": {"n": n}, "event": "message"}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        // Fresh read returns everything and ends because the stream polls
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{}/streams/main", session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("id: 1"));
        assert!(text.contains("id: 2"));

        // Resuming after event 1 only returns event 2
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{}/streams/main", session_id))
                    .header("Last-Event-ID", "1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let text = body_text(response).await;
        assert!(!text.contains("id: 1\n"));
        assert!(text.contains("id: 2"));
        assert!(text.contains("{\"n\":2}"));
    }

    #[tokio::test]
    async fn test_carriage_returns_in_payload_are_folded() {
        let app = test_app();
        let session_id = start_session(&app).await;

        app.clone()
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{}/streams", session_id),
                json!({"stream_id": "main", "mode": "polling"}),
            ))
            .await
            .unwrap();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{}/streams/main/events", session_id),
                json!({"data": "line\r\nnext\rlast"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{}/streams/main", session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("data: line\ndata: next\ndata: last\n"));
        assert!(!text.contains('\r'));
    }

    #[tokio::test]
    async fn test_multiline_event_type_rejected() {
        let app = test_app();
        let session_id = start_session(&app).await;

        app.clone()
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{}/streams", session_id),
                json!({"stream_id": "main", "mode": "polling"}),
            ))
            .await
            .unwrap();
        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{}/streams/main/events", session_id),
                json!({"data": 1, "event": "a\nb"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_duplicate_stream_conflict() {
        let app = test_app();
        let session_id = start_session(&app).await;
        let uri = format!("/sessions/{}/streams", session_id);

        let first = app
            .clone()
            .oneshot(json_request("POST", &uri, json!({"stream_id": "main"})))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app
            .clone()
            .oneshot(json_request("POST", &uri, json!({"stream_id": "main"})))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(second).await["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_unknown_resume_point_is_not_found() {
        let app = test_app();
        let session_id = start_session(&app).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{}/streams/main", session_id))
                    .header("Last-Event-ID", "999")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_closed_stream_drains_then_ends() {
        let app = test_app();
        let session_id = start_session(&app).await;

        app.clone()
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{}/streams", session_id),
                json!({"stream_id": "main", "mode": "streaming"}),
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{}/streams/main/events", session_id),
                json!({"data": "last words"}),
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/sessions/{}/streams/main/close", session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        // Publishing after close has no writer
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{}/streams/main/events", session_id),
                json!({"data": "too late"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{}/streams/main", session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let text = body_text(response).await;
        assert!(text.contains("data: last words"));
    }

    #[tokio::test]
    async fn test_delete_session_purges_streams() {
        let app = test_app();
        let session_id = start_session(&app).await;

        app.clone()
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{}/streams", session_id),
                json!({"stream_id": "main", "mode": "polling"}),
            ))
            .await
            .unwrap();

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("DELETE")
                        .uri(format!("/sessions/{}", session_id))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{}/streams/main", session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
