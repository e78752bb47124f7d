//! Static file serving.
//!
//! Everything that is not a live reload endpoint is served from the root
//! directory, with `index.html` for directories.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::middleware;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;

use crate::middleware::{headers, inject};
use crate::state::AppState;

/// Create the fallback router serving files from `root`.
///
/// With `inject_script` set, HTML pages get the reload script.
pub(crate) fn static_router(root: &Path, inject_script: bool) -> Router<Arc<AppState>> {
    let serve_dir = ServeDir::new(root).append_index_html_on_directories(true);
    let stack = ServiceBuilder::new().layer(headers::no_cache_layer());

    if inject_script {
        Router::new().fallback_service(
            stack
                .layer(middleware::from_fn(inject::inject_reload_script))
                .service(serve_dir),
        )
    } else {
        Router::new().fallback_service(stack.service(serve_dir))
    }
}
