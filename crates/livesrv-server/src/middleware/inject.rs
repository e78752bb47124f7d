//! Reload script injection.
//!
//! Wraps the static file stage: successful HTML responses are buffered and
//! the client script is inserted before `</head>`. Everything else passes
//! through unbuffered.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Client script: reload the page on any message from `/sse`.
pub(crate) const RELOAD_SCRIPT: &str = r#"<script type="text/javascript">new EventSource("/sse").onmessage=()=>window.location.reload()</script>"#;

const HEAD_CLOSE: &[u8] = b"</head>";

/// Largest HTML page that is buffered for rewriting.
const MAX_HTML_BYTES: usize = 16 * 1024 * 1024;

/// Insert [`RELOAD_SCRIPT`] into HTML responses.
pub(crate) async fn inject_reload_script(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() != StatusCode::OK || !is_html(response.headers()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let html = match axum::body::to_bytes(body, MAX_HTML_BYTES).await {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to buffer HTML response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let body = match insert_script(&html) {
        Some(rewritten) => {
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(rewritten.len()));
            Body::from(rewritten)
        }
        None => Body::from(html),
    };

    Response::from_parts(parts, body)
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"))
}

/// Return `html` with the script inserted before the first `</head>`.
///
/// Returns `None` if the page has no `</head>`.
fn insert_script(html: &[u8]) -> Option<Vec<u8>> {
    let pos = html
        .windows(HEAD_CLOSE.len())
        .position(|w| w.eq_ignore_ascii_case(HEAD_CLOSE))?;

    let mut out = Vec::with_capacity(html.len() + RELOAD_SCRIPT.len());
    out.extend_from_slice(&html[..pos]);
    out.extend_from_slice(RELOAD_SCRIPT.as_bytes());
    out.extend_from_slice(&html[pos..]);
    Some(out)
}
