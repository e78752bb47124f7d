//! Application state.
//!
//! Shared state for all request handlers.

use std::path::PathBuf;
use std::sync::Arc;

use livesrv_config::ClientKeyMode;

use crate::live_reload::Broker;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Registry of connected reload subscribers.
    pub(crate) broker: Arc<Broker>,
    /// How subscriber keys are derived.
    pub(crate) client_key: ClientKeyMode,
    /// Directory served as static files.
    pub(crate) root: PathBuf,
    /// Inject the reload script into HTML pages.
    pub(crate) inject: bool,
}
