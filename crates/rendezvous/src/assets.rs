use axum::http::{header, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Body served when a requested asset cannot be read.
pub const FALLBACK_PAGE: &str = "<p>This is a Rendezvous Bootstrap Server</p>";

/// Serve a static asset below `root`, or [`FALLBACK_PAGE`] on any failure.
pub async fn serve(root: &Path, uri: &Uri) -> Response {
    info!("received HTTP request for {}", uri.path());
    let Some(path) = resolve(root, uri.path()) else {
        debug!(path = uri.path(), "refusing path outside static directory");
        return Html(FALLBACK_PAGE).into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type(&path))],
            body,
        )
            .into_response(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "could not read asset");
            Html(FALLBACK_PAGE).into_response()
        }
    }
}

/// Map a request path onto a file below `root`.
///
/// `/` maps to `index.html`. Returns `None` for paths that would leave `root`.
#[must_use]
pub fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    let relative = if relative.is_empty() {
        "index.html"
    } else {
        relative
    };
    let mut resolved = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("wasm") => "application/wasm",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
