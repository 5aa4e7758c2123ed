//! Static file serving module
//!
//! Loads files of the built front-end bundle and the `index.html` shell that
//! every client-side route renders into.

use crate::handler::router::RequestContext;
use crate::http::{self, cache, mime, response};
use crate::logger;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Map a decoded request path to a file inside `dist_dir`
///
/// Returns `None` for directories, missing files, and anything that would
/// resolve outside the bundle directory.
pub fn resolve_asset(dist_dir: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = Path::new(request_path.trim_start_matches('/'));
    if relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }

    let dist_canonical = dist_dir.canonicalize().ok()?;
    let candidate = dist_dir.join(relative).canonicalize().ok()?;
    if !candidate.starts_with(&dist_canonical) {
        logger::log_warning(&format!(
            "Path traversal attempt blocked: {request_path} -> {}",
            candidate.display()
        ));
        return None;
    }

    candidate.is_file().then_some(candidate)
}

/// Serve a bundle file found by [`resolve_asset`]
pub async fn serve_asset(ctx: &RequestContext, file_path: &Path) -> Response<Full<Bytes>> {
    match load_file(file_path).await {
        Some(data) => build_file_response(
            ctx,
            data,
            mime::content_type_for(file_path),
            response::ASSET_CACHE_CONTROL,
        ),
        None => http::build_404_response(),
    }
}

/// Serve the application shell
pub async fn serve_index(ctx: &RequestContext, dist_dir: &Path, index_file: &str) -> Response<Full<Bytes>> {
    let index_path = dist_dir.join(index_file);
    match load_file(&index_path).await {
        Some(data) => build_file_response(
            ctx,
            data,
            mime::content_type_for(&index_path),
            response::INDEX_CACHE_CONTROL,
        ),
        None => {
            logger::log_warning(&format!(
                "Front-end entry '{}' is missing, was the bundle built?",
                index_path.display()
            ));
            http::build_404_response()
        }
    }
}

async fn load_file(path: &Path) -> Option<Bytes> {
    match fs::read(path).await {
        Ok(data) => Some(Bytes::from(data)),
        // Not found is the common case and is reported by the caller
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            logger::log_error(&format!("Failed to read file '{}': {e}", path.display()));
            None
        }
    }
}

/// Build file response with `ETag` validation
fn build_file_response(
    ctx: &RequestContext,
    data: Bytes,
    content_type: &str,
    cache_control: &str,
) -> Response<Full<Bytes>> {
    let etag = cache::generate_etag(&data);

    // Check if client has cached version
    if cache::is_not_modified(ctx.if_none_match.as_deref(), &etag) {
        return http::build_304_response(&etag, cache_control);
    }

    http::build_cached_response(data, content_type, &etag, cache_control, ctx.is_head)
}
