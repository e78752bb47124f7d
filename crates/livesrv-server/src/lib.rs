//! Live reload HTTP server.
//!
//! Serves a directory over HTTP and pushes reload notifications to every open
//! browser tab:
//! - `GET /sse` opens a server-sent event stream and registers the client
//! - any request to `/sse/reload` broadcasts `data: reload` to all clients
//! - everything else is served from the root directory, with a small reload
//!   script injected into HTML pages
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use livesrv_server::{ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         port: 3000,
//!         root: PathBuf::from("public"),
//!         ..ServerConfig::default()
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum server (livesrv-server)
//!                        │
//!                        ├─► GET /sse ──► Subscription ──register──► Broker
//!                        │                                             ▲
//!                        ├─► /sse/reload ──────────broadcast───────────┤
//!                        │                                             │
//!                        ├─► FileWatcher (notify, optional) ─broadcast─┘
//!                        │
//!                        └─► Static files (tower-http ServeDir + script injection)
//! ```

mod app;
mod error;
pub mod live_reload;
mod middleware;
mod state;
mod static_files;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use livesrv_config::ClientKeyMode;
use state::AppState;

pub use error::ServerError;
use live_reload::{Broker, FileWatcher};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory served as static files.
    pub root: PathBuf,
    /// Inject the reload script into HTML pages.
    pub inject: bool,
    /// How subscriber keys are derived.
    pub client_key: ClientKeyMode,
    /// Broadcast a reload when watched files change.
    pub watch: bool,
    /// Glob patterns the watcher reacts to, relative to `root`.
    pub watch_patterns: Vec<String>,
    /// Quiet period before a batch of changes triggers a reload.
    pub debounce: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3000,
            root: PathBuf::from("."),
            inject: true,
            client_key: ClientKeyMode::default(),
            watch: false,
            watch_patterns: vec!["**/*".to_owned()],
            debounce: Duration::from_millis(100),
        }
    }
}

/// Run the server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the file watcher cannot be started, the address
/// cannot be bound, or the server fails while running.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let broker = Arc::new(Broker::new());

    // Dropping the watcher stops it, so it lives as long as the server.
    let _watcher = if config.watch {
        Some(FileWatcher::start(
            &config.root,
            &config.watch_patterns,
            config.debounce,
            Arc::clone(&broker),
        )?)
    } else {
        None
    };

    let state = Arc::new(AppState {
        broker: Arc::clone(&broker),
        client_key: config.client_key,
        root: config.root,
        inject: config.inject,
    });
    let app = app::create_router(state);

    let address = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;
    tracing::info!(address = %address, "Starting server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(broker))
    .await?;

    Ok(())
}

/// Wait for Ctrl-C, then end every open event stream.
///
/// Open streams never finish on their own, so graceful shutdown would wait
/// forever without closing them.
async fn shutdown_signal(broker: Arc<Broker>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    let closed = broker.close_all();
    tracing::info!(subscribers = closed, "Shutdown signal received, stopping server...");
}

/// Create server configuration from the loaded config file.
#[must_use]
pub fn server_config_from_config(config: &livesrv_config::Config) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        root: config.root.clone(),
        inject: config.live_reload.inject,
        client_key: config.live_reload.client_key,
        watch: config.live_reload.watch,
        watch_patterns: config.live_reload.watch_patterns.clone(),
        debounce: Duration::from_millis(config.live_reload.debounce_ms),
    }
}
