//! Event-stream subscription endpoint.
//!
//! A subscription registers its sink with the broker, then parks on a
//! cancellation token until the response body is dropped by the HTTP runtime.
//! Parked subscriptions are plain tokio tasks, so idle subscribers cost no
//! threads.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use livesrv_config::ClientKeyMode;
use tokio_util::sync::CancellationToken;

use super::broker::{Broker, ClientKey, Connection};
use super::sink::{self, ResponseChannel};
use crate::error::ServerError;
use crate::state::AppState;

/// An accepted subscriber waiting for its connection to close.
///
/// Holds only a weak handle to its connection: once the broker drops the
/// connection (write failure, shutdown) the response body must be able to end.
#[derive(Debug)]
pub struct Subscription {
    broker: Arc<Broker>,
    key: ClientKey,
    connection: Weak<Connection>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Register a subscriber on `channel` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::StreamingUnsupported`] if the channel cannot
    /// stream; nothing is registered in that case.
    pub fn accept<C: ResponseChannel>(
        broker: Arc<Broker>,
        key: ClientKey,
        channel: C,
    ) -> Result<Self, ServerError> {
        let sink = channel
            .into_streaming()
            .ok_or(ServerError::StreamingUnsupported)?;

        let connection = broker.register(key.clone(), Connection::new(sink));

        Ok(Self {
            broker,
            key,
            connection: Arc::downgrade(&connection),
            cancel: CancellationToken::new(),
        })
    }

    /// Registry key of this subscriber.
    #[must_use]
    pub fn key(&self) -> &ClientKey {
        &self.key
    }

    /// Token that ends the subscription when cancelled.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait until the connection is cancelled, then unregister it.
    ///
    /// Leaves the key alone if another connection has since been registered
    /// under it.
    pub async fn run(self) {
        self.cancel.cancelled().await;
        if let Some(connection) = self.connection.upgrade() {
            self.broker.unregister_connection(&self.key, &connection);
        }
    }
}

/// Derive the registry key for a connection from `remote`.
pub(crate) fn client_key(mode: ClientKeyMode, remote: SocketAddr) -> ClientKey {
    match mode {
        ClientKeyMode::Session => ClientKey::session(remote),
        ClientKeyMode::Remote => ClientKey::remote(remote),
    }
}

/// Handle `GET /sse`.
pub(crate) async fn sse_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
) -> Result<Response, ServerError> {
    let key = client_key(state.client_key, remote);
    let (channel, frames) = sink::channel();

    let subscription = Subscription::accept(Arc::clone(&state.broker), key, channel)?;
    let body = Body::from_stream(frames.cancel_on_drop(subscription.cancellation()));

    tracing::info!(client = %subscription.key(), "Subscriber connected");
    tokio::spawn(subscription.run());

    Ok(event_stream_response(body))
}

/// Wrap `body` with the event-stream headers.
fn event_stream_response(body: Body) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;
    use crate::live_reload::RELOAD_FRAME;
    use crate::live_reload::sink::testing::BufferedChannel;

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_non_streaming_channel_rejected() {
        let broker = Arc::new(Broker::new());

        let result = Subscription::accept(
            Arc::clone(&broker),
            ClientKey::remote(addr()),
            BufferedChannel,
        );

        assert!(matches!(result, Err(ServerError::StreamingUnsupported)));
        assert!(broker.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_reload_cancel() {
        let broker = Arc::new(Broker::new());
        let (channel, frames) = sink::channel();

        let subscription =
            Subscription::accept(Arc::clone(&broker), ClientKey::remote(addr()), channel).unwrap();
        let mut frames = frames.cancel_on_drop(subscription.cancellation());
        let task = tokio::spawn(subscription.run());

        assert_eq!(broker.len(), 1);
        broker.reload();

        let frame = frames.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], RELOAD_FRAME);

        drop(frames);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(broker.is_empty());
    }

    #[tokio::test]
    async fn test_run_unregisters_only_after_cancel() {
        let broker = Arc::new(Broker::new());
        let (channel, _frames) = sink::channel();

        let subscription =
            Subscription::accept(Arc::clone(&broker), ClientKey::remote(addr()), channel).unwrap();
        let cancel = subscription.cancellation();
        let task = tokio::spawn(subscription.run());

        tokio::task::yield_now().await;
        assert_eq!(broker.len(), 1);

        cancel.cancel();
        task.await.unwrap();
        assert!(broker.is_empty());
    }

    #[tokio::test]
    async fn test_stale_disconnect_keeps_reconnected_subscriber() {
        let broker = Arc::new(Broker::new());
        let key = ClientKey::remote("10.0.0.1:4000".parse().unwrap());

        let (old_channel, old_frames) = sink::channel();
        let old = Subscription::accept(Arc::clone(&broker), key.clone(), old_channel).unwrap();
        let old_frames = old_frames.cancel_on_drop(old.cancellation());
        let old_task = tokio::spawn(old.run());

        let (new_channel, new_frames) = sink::channel();
        let new = Subscription::accept(Arc::clone(&broker), key.clone(), new_channel).unwrap();
        let mut new_frames = new_frames.cancel_on_drop(new.cancellation());
        let new_task = tokio::spawn(new.run());

        drop(old_frames);
        old_task.await.unwrap();

        assert_eq!(broker.len(), 1);
        assert_eq!(broker.reload().delivered, 1);
        let frame = new_frames.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], RELOAD_FRAME);

        drop(new_frames);
        new_task.await.unwrap();
        assert!(broker.is_empty());
    }

    #[tokio::test]
    async fn test_run_after_broker_closed() {
        let broker = Arc::new(Broker::new());
        let (channel, frames) = sink::channel();

        let subscription =
            Subscription::accept(Arc::clone(&broker), ClientKey::remote(addr()), channel).unwrap();
        let mut frames = frames.cancel_on_drop(subscription.cancellation());
        let task = tokio::spawn(subscription.run());

        assert_eq!(broker.close_all(), 1);
        assert!(frames.next().await.is_none());

        drop(frames);
        task.await.unwrap();
        assert!(broker.is_empty());
    }

    #[test]
    fn test_client_key_modes() {
        let remote = client_key(ClientKeyMode::Remote, addr());
        assert_eq!(remote, ClientKey::remote(addr()));

        let a = client_key(ClientKeyMode::Session, addr());
        let b = client_key(ClientKeyMode::Session, addr());
        assert_ne!(a, b);
    }

    #[test]
    fn test_event_stream_headers() {
        let response = event_stream_response(Body::empty());
        let headers = response.headers();

        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
