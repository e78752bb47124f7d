//! Error types for the HTTP server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::live_reload::WatchError;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The response channel cannot stream events incrementally.
    #[error("streaming unsupported")]
    StreamingUnsupported,

    /// Listening socket could not be bound.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Requested `host:port`.
        address: String,
        /// Underlying socket error.
        source: std::io::Error,
    },

    /// File watcher could not be started.
    #[error("File watcher error: {0}")]
    Watch(#[from] WatchError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_streaming_unsupported_response() {
        let response = ServerError::StreamingUnsupported.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"streaming unsupported");
    }

    #[test]
    fn test_bind_error_message() {
        let err = ServerError::Bind {
            address: "0.0.0.0:80".to_owned(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().starts_with("Failed to bind 0.0.0.0:80"));
    }
}
