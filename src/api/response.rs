// API response utility functions module

use crate::logger;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::json;

/// Methods the API answers, advertised on preflight
pub const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";

/// Paths listed in the 404 body
pub const ENDPOINTS: &[&str] = &[
    "GET /ping",
    "POST /api/connect",
    "POST /api/disconnect",
    "GET /api/status",
    "GET /api/history",
    "GET /api/analyze",
    "GET /api/routes",
    "POST /start",
    "POST /stop",
    "GET /status",
];

/// Build JSON response, with permissive CORS headers when enabled
pub fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
    enable_cors: bool,
) -> Response<Full<Bytes>> {
    let (status, json) = match serde_json::to_vec(body) {
        Ok(j) => (status, j),
        Err(e) => {
            logger::log_error(&format!("Failed to serialize response: {e}"));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"error":"Internal server error"}"#.to_vec(),
            )
        }
    };

    let mut builder = Response::builder()
        .status(status)
        .header("Content-Type", "application/json");
    if enable_cors {
        builder = builder.header("Access-Control-Allow-Origin", "*");
    }

    builder.body(Full::new(Bytes::from(json))).unwrap_or_else(|e| {
        logger::log_error(&format!("Failed to build response: {e}"));
        Response::new(Full::new(Bytes::from("Error")))
    })
}

/// `{"msg": ...}` body
pub fn msg_response(status: StatusCode, msg: &str, enable_cors: bool) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "msg": msg }), enable_cors)
}

/// `{"error": ...}` body
pub fn error_response(status: StatusCode, error: &str, enable_cors: bool) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "error": error }), enable_cors)
}

/// 404 Not Found response
pub fn not_found(enable_cors: bool) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &json!({
            "error": "Not Found",
            "available_endpoints": ENDPOINTS,
        }),
        enable_cors,
    )
}

/// 413 Payload Too Large response
pub fn payload_too_large(max_body_size: u64, enable_cors: bool) -> Response<Full<Bytes>> {
    error_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        &format!("request body exceeds {max_body_size} bytes"),
        enable_cors,
    )
}
