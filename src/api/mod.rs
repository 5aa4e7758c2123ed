// API module entry
// JSON management API used by the Subscribe, Publish and DataDisplay pages

mod handlers;
mod response;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::sync::Arc;

use crate::config::AppState;
use crate::http;
use crate::logger;

// Re-export public types
pub use response::*;

/// API route handler
///
/// Dispatches to handler functions based on request path and method
pub async fn handle_api_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let enable_cors = state.config.http.enable_cors;

    if method == Method::OPTIONS {
        return Ok(http::build_options_response(enable_cors, ALLOWED_METHODS));
    }

    let max_body_size = state.config.http.max_body_size;
    if content_length(&req).is_some_and(|size| size > max_body_size) {
        logger::log_warning(&format!(
            "API request body too large on {path} (max: {max_body_size})"
        ));
        return Ok(payload_too_large(max_body_size, enable_cors));
    }

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/ping") => handlers::ping(&state),
        // Subscriber control
        (&Method::POST, "/api/connect") => handlers::connect(&state).await,
        (&Method::POST, "/api/disconnect") => handlers::disconnect(&state).await,
        (&Method::GET, "/api/status") => handlers::mqtt_status(&state),
        (&Method::GET, "/api/history") => handlers::history(Arc::clone(&state)).await,
        // Analysis
        (&Method::GET, "/api/analyze") => handlers::analyze(Arc::clone(&state)).await,
        // Front-end route table
        (&Method::GET, "/api/routes") => handlers::routes(&state),
        // Replay publisher
        (&Method::POST, "/start") => handlers::start_replay(&state),
        (&Method::POST, "/stop") => handlers::stop_replay(&state),
        (&Method::GET, "/status") => handlers::replay_status(&state),
        // Unknown route
        _ => not_found(enable_cors),
    };

    logger::log_api_request(method.as_str(), &path, response.status().as_u16());
    Ok(response)
}

fn content_length<B>(req: &Request<B>) -> Option<u64> {
    req.headers()
        .get(hyper::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
