//! Request routing dispatch module
//!
//! Entry point of the front-end listener: method validation, bundle files,
//! then the client-side route table with history-mode fallback.

use crate::config::AppState;
use crate::handler::static_files;
use crate::http;
use crate::logger;
use crate::routing::Resolution;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

const LIVENESS_PATH: &str = "/healthz";
const READINESS_PATH: &str = "/readyz";
const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS";

/// Request context encapsulating information needed for request processing
pub struct RequestContext {
    /// Percent-decoded path without query
    pub path: String,
    pub is_head: bool,
    pub if_none_match: Option<String>,
}

/// Main entry point for front-end requests
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method();

    // 1. Check HTTP method
    if let Some(resp) = check_http_method(method, state.config.http.enable_cors) {
        return Ok(resp);
    }

    // 2. Check body size
    if let Some(resp) = check_body_size(&req, state.config.http.max_body_size) {
        return Ok(resp);
    }

    // 3. Decode path
    let raw_path = req.uri().path();
    let Ok(path) = urlencoding::decode(raw_path) else {
        logger::log_warning(&format!("Undecodable request path: {raw_path}"));
        return Ok(http::build_404_response());
    };

    let ctx = RequestContext {
        path: path.into_owned(),
        is_head: *method == Method::HEAD,
        if_none_match: req
            .headers()
            .get(hyper::header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string),
    };

    Ok(route_request(&ctx, &state).await)
}

/// Check HTTP method and return appropriate response for non-GET/HEAD methods
fn check_http_method(method: &Method, enable_cors: bool) -> Option<Response<Full<Bytes>>> {
    match *method {
        Method::GET | Method::HEAD => None,
        Method::OPTIONS => Some(http::build_options_response(enable_cors, ALLOWED_METHODS)),
        _ => {
            logger::log_warning(&format!("Method not allowed: {method}"));
            Some(http::build_405_response())
        }
    }
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size<B>(req: &Request<B>, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let content_length = req.headers().get(hyper::header::CONTENT_LENGTH)?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_error(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(http::build_413_response())
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', skipping size check"
                ));
                None
            }
            _ => None,
        },
    )
}

/// Route request: probes, bundle files, then the client-side route table
async fn route_request(ctx: &RequestContext, state: &AppState) -> Response<Full<Bytes>> {
    // 0. Health check endpoints (highest priority, always fast)
    if ctx.path == LIVENESS_PATH || ctx.path == READINESS_PATH {
        return http::build_health_response(ctx.is_head);
    }

    let spa = &state.config.spa;
    let dist_dir = Path::new(&spa.dist_dir);

    // 1. Files of the built bundle
    if let Some(file) = static_files::resolve_asset(dist_dir, &ctx.path) {
        return static_files::serve_asset(ctx, &file).await;
    }

    // 2. Client-side routes
    match state.routes.resolve(&ctx.path) {
        Resolution::Page {
            path,
            redirected_from: Some(from),
            ..
        } => {
            let location = state.routes.history().href(path);
            logger::log_debug(&format!("[Route] {from} -> {location}"));
            http::build_redirect_response(&location)
        }
        Resolution::Page { page, .. } => {
            logger::log_debug(&format!("[Route] {} renders {page}", ctx.path));
            static_files::serve_index(ctx, dist_dir, &spa.index_file).await
        }
        // Unknown paths still get the shell; the browser router decides
        Resolution::NoMatch { .. } if spa.fallback => {
            static_files::serve_index(ctx, dist_dir, &spa.index_file).await
        }
        Resolution::NoMatch { path } => {
            logger::log_debug(&format!("[Route] No route for {path}"));
            http::build_404_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::routing::HistoryMode;
    use http_body_util::BodyExt;

    const INDEX: &str = "<!doctype html><div id=\"app\"></div>";

    struct Fixture {
        state: Arc<AppState>,
        _dir: tempfile::TempDir,
    }

    fn fixture(configure: impl FnOnce(&mut Config)) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let dist = dir.path().join("dist");
        std::fs::create_dir_all(dist.join("assets")).unwrap();
        std::fs::write(dist.join("index.html"), INDEX).unwrap();
        std::fs::write(dist.join("assets/app.css"), "body{}").unwrap();

        let mut config = Config::load_from("__no_such_config__").unwrap();
        config.spa.dist_dir = dist.to_string_lossy().into_owned();
        config.storage.data_dir = dir.path().to_string_lossy().into_owned();
        configure(&mut config);
        Fixture {
            state: Arc::new(AppState::new(&config).unwrap()),
            _dir: dir,
        }
    }

    async fn send(
        state: &Arc<AppState>,
        method: Method,
        uri: &str,
        if_none_match: Option<&str>,
    ) -> Response<Full<Bytes>> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(etag) = if_none_match {
            builder = builder.header("If-None-Match", etag);
        }
        handle_request(builder.body(()).unwrap(), Arc::clone(state))
            .await
            .unwrap()
    }

    async fn body_text(resp: Response<Full<Bytes>>) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_root_redirects_to_subscribe() {
        let f = fixture(|_| {});
        let resp = send(&f.state, Method::GET, "/", None).await;
        assert_eq!(resp.status(), 302);
        assert_eq!(resp.headers()["Location"], "/subscribe");
    }

    #[tokio::test]
    async fn test_root_redirect_in_hash_mode() {
        let f = fixture(|c| c.spa.history = HistoryMode::Hash);
        let resp = send(&f.state, Method::GET, "/", None).await;
        assert_eq!(resp.headers()["Location"], "/#/subscribe");
    }

    #[tokio::test]
    async fn test_page_routes_serve_index() {
        let f = fixture(|_| {});
        for path in ["/subscribe", "/publish", "/analyze", "/analyze/", "/publish?x=1"] {
            let resp = send(&f.state, Method::GET, path, None).await;
            assert_eq!(resp.status(), 200, "{path}");
            assert_eq!(resp.headers()["Cache-Control"], "no-cache");
            assert_eq!(body_text(resp).await, INDEX);
        }
    }

    #[tokio::test]
    async fn test_unknown_path_falls_back() {
        let f = fixture(|_| {});
        let resp = send(&f.state, Method::GET, "/settings", None).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(body_text(resp).await, INDEX);

        let f = fixture(|c| c.spa.fallback = false);
        let resp = send(&f.state, Method::GET, "/settings", None).await;
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_asset_served_with_etag() {
        let f = fixture(|_| {});
        let resp = send(&f.state, Method::GET, "/assets/app.css", None).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["Content-Type"], "text/css; charset=utf-8");
        let etag = resp.headers()["ETag"].to_str().unwrap().to_string();

        let resp = send(&f.state, Method::GET, "/assets/app.css", Some(&etag)).await;
        assert_eq!(resp.status(), 304);
    }

    #[tokio::test]
    async fn test_percent_encoded_asset() {
        let f = fixture(|_| {});
        std::fs::write(
            Path::new(&f.state.config.spa.dist_dir).join("assets/my file.css"),
            "a{}",
        )
        .unwrap();
        let resp = send(&f.state, Method::GET, "/assets/my%20file.css", None).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(body_text(resp).await, "a{}");
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let f = fixture(|_| {});
        let resp = send(&f.state, Method::HEAD, "/subscribe", None).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers()["Content-Length"].to_str().unwrap(),
            INDEX.len().to_string()
        );
        assert!(body_text(resp).await.is_empty());
    }

    #[tokio::test]
    async fn test_methods() {
        let f = fixture(|_| {});
        let resp = send(&f.state, Method::OPTIONS, "/subscribe", None).await;
        assert_eq!(resp.status(), 204);
        let resp = send(&f.state, Method::POST, "/subscribe", None).await;
        assert_eq!(resp.status(), 405);
        assert_eq!(resp.headers()["Allow"], "GET, HEAD, OPTIONS");
    }

    #[tokio::test]
    async fn test_health_probes() {
        let f = fixture(|_| {});
        for path in ["/healthz", "/readyz"] {
            let resp = send(&f.state, Method::GET, path, None).await;
            assert_eq!(resp.status(), 200);
            assert_eq!(body_text(resp).await, "ok");
        }
    }

    #[tokio::test]
    async fn test_missing_index_is_404() {
        let f = fixture(|_| {});
        std::fs::remove_file(Path::new(&f.state.config.spa.dist_dir).join("index.html")).unwrap();
        let resp = send(&f.state, Method::GET, "/subscribe", None).await;
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_traversal_falls_through_to_routes() {
        let f = fixture(|c| c.spa.fallback = false);
        let resp = send(&f.state, Method::GET, "/assets/..%2F..%2Fsecret", None).await;
        assert_eq!(resp.status(), 404);
    }
}
