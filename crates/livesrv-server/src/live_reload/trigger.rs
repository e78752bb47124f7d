//! Reload trigger endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

/// Handle any request to `/sse/reload` by broadcasting a reload.
///
/// Per-subscriber failures are never reported to the caller.
pub(crate) async fn reload_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let report = state.broker.reload();
    tracing::info!(
        delivered = report.delivered,
        dropped = report.dropped,
        "Reload broadcast"
    );
    StatusCode::OK
}
