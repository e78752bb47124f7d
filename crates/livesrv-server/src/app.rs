//! Router construction.
//!
//! Builds the axum router with the live reload endpoints and the static file
//! fallback.

use std::sync::Arc;

use axum::Router;
use axum::routing::{any, get};
use tower_http::trace::TraceLayer;

use crate::live_reload;
use crate::state::AppState;
use crate::static_files;

/// Event-stream subscription endpoint.
pub(crate) const SSE_PATH: &str = "/sse";

/// Reload trigger endpoint.
pub(crate) const RELOAD_PATH: &str = "/sse/reload";

/// Create the application router.
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(SSE_PATH, get(live_reload::sse_handler))
        .route(RELOAD_PATH, any(live_reload::reload_handler))
        .merge(static_files::static_router(&state.root, state.inject))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::path::Path;
    use std::time::Duration;

    use axum::body::{Body, Bytes};
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode, header};
    use futures::StreamExt;
    use livesrv_config::ClientKeyMode;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use super::*;
    use crate::live_reload::{Broker, RELOAD_FRAME};
    use crate::middleware::inject::RELOAD_SCRIPT;

    fn state(root: &Path, broker: &Arc<Broker>, inject: bool) -> Arc<AppState> {
        Arc::new(AppState {
            broker: Arc::clone(broker),
            client_key: ClientKeyMode::Session,
            root: root.to_path_buf(),
            inject,
        })
    }

    fn subscribe_request(port: u16) -> Request<Body> {
        let mut request = Request::builder().uri(SSE_PATH).body(Body::empty()).unwrap();
        let remote: SocketAddr = ([127, 0, 0, 1], port).into();
        request.extensions_mut().insert(ConnectInfo(remote));
        request
    }

    async fn trigger(app: &Router, method: &str) -> (StatusCode, Bytes) {
        let request = Request::builder()
            .method(method)
            .uri(RELOAD_PATH)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, header::HeaderMap, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        (
            parts.status,
            parts.headers,
            String::from_utf8(body.to_vec()).unwrap(),
        )
    }

    async fn wait_until_empty(broker: &Broker) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !broker.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscriber was not unregistered");
    }

    #[tokio::test]
    async fn test_subscribe_trigger_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(Broker::new());
        let app = create_router(state(dir.path(), &broker, true));

        let response = app.clone().oneshot(subscribe_request(50001)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(response.headers()[header::CONNECTION], "keep-alive");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(broker.len(), 1);

        let (status, body) = trigger(&app, "GET").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());

        let mut frames = response.into_body().into_data_stream();
        let frame = frames.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], RELOAD_FRAME);

        drop(frames);
        wait_until_empty(&broker).await;
    }

    #[tokio::test]
    async fn test_two_subscribers_receive_every_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(Broker::new());
        let app = create_router(state(dir.path(), &broker, true));

        let x = app.clone().oneshot(subscribe_request(50001)).await.unwrap();
        let y = app.clone().oneshot(subscribe_request(50002)).await.unwrap();
        assert_eq!(broker.len(), 2);

        trigger(&app, "POST").await;
        trigger(&app, "PUT").await;

        for response in [x, y] {
            let mut frames = response.into_body().into_data_stream();
            for _ in 0..2 {
                let frame = frames.next().await.unwrap().unwrap();
                assert_eq!(&frame[..], RELOAD_FRAME);
            }
        }
    }

    #[tokio::test]
    async fn test_trigger_without_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(Broker::new());
        let app = create_router(state(dir.path(), &broker, true));

        let (status, body) = trigger(&app, "DELETE").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_ends_open_streams() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(Broker::new());
        let app = create_router(state(dir.path(), &broker, true));

        let response = app.clone().oneshot(subscribe_request(50003)).await.unwrap();
        assert_eq!(broker.close_all(), 1);

        let mut frames = response.into_body().into_data_stream();
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn test_static_html_gets_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("index.html"),
            "<html><head><title>home</title></head><body>hi</body></html>",
        )
        .unwrap();
        let broker = Arc::new(Broker::new());
        let app = create_router(state(dir.path(), &broker, true));

        let (status, headers, body) = get(&app, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(RELOAD_SCRIPT));
        assert!(body.ends_with("</head><body>hi</body></html>"));
        assert_eq!(headers[header::CONTENT_LENGTH], body.len().to_string());
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    }

    #[tokio::test]
    async fn test_static_non_html_untouched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.css"), "body { color: red }").unwrap();
        let broker = Arc::new(Broker::new());
        let app = create_router(state(dir.path(), &broker, true));

        let (status, _, body) = get(&app, "/app.css").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "body { color: red }");
    }

    #[tokio::test]
    async fn test_injection_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let page = "<html><head></head><body></body></html>";
        std::fs::write(dir.path().join("page.html"), page).unwrap();
        let broker = Arc::new(Broker::new());
        let app = create_router(state(dir.path(), &broker, false));

        let (_, _, body) = get(&app, "/page.html").await;
        assert_eq!(body, page);
    }

    #[tokio::test]
    async fn test_missing_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(Broker::new());
        let app = create_router(state(dir.path(), &broker, true));

        let (status, _, _) = get(&app, "/nope.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
