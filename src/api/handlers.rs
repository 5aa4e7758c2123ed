// Management API handlers module

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use super::response::{error_response, json_response, msg_response};
use crate::config::AppState;
use crate::logger;
use crate::routing::{HistoryMode, Route};
use crate::telemetry::{AnalysisError, ControlError, MqttStatus};

type ApiResponse = Response<Full<Bytes>>;

#[derive(Serialize)]
struct ConnectResponse {
    msg: &'static str,
    status: MqttStatus,
}

#[derive(Serialize)]
struct RoutesResponse<'a> {
    history: HistoryMode,
    routes: &'a [Route],
}

fn cors(state: &AppState) -> bool {
    state.config.http.enable_cors
}

/// `GET /ping`
pub fn ping(state: &AppState) -> ApiResponse {
    msg_response(StatusCode::OK, "backend ok", cors(state))
}

/// `POST /api/connect`
pub async fn connect(state: &AppState) -> ApiResponse {
    match state.subscriber.connect().await {
        Ok(status) => json_response(
            StatusCode::OK,
            &ConnectResponse {
                msg: "connected",
                status,
            },
            cors(state),
        ),
        Err(e) => {
            logger::log_error(&format!("MQTT connect failed: {e}"));
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({
                    "msg": "connect failed",
                    "error": e.to_string(),
                    "status": state.subscriber.status(),
                }),
                cors(state),
            )
        }
    }
}

/// `POST /api/disconnect`
pub async fn disconnect(state: &AppState) -> ApiResponse {
    state.subscriber.disconnect().await;
    msg_response(StatusCode::OK, "disconnected", cors(state))
}

/// `GET /api/status`
pub fn mqtt_status(state: &AppState) -> ApiResponse {
    json_response(StatusCode::OK, &state.subscriber.status(), cors(state))
}

/// `GET /api/history`
pub async fn history(state: Arc<AppState>) -> ApiResponse {
    let limit = state.config.storage.history_limit;
    let store = Arc::clone(&state.store);
    match tokio::task::spawn_blocking(move || store.history(limit)).await {
        Ok(Ok(rows)) => json_response(StatusCode::OK, &rows, cors(&state)),
        Ok(Err(e)) => {
            logger::log_error(&format!("History read failed: {e}"));
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), cors(&state))
        }
        Err(e) => {
            logger::log_error(&format!("History task failed: {e}"));
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), cors(&state))
        }
    }
}

/// `GET /api/analyze`
///
/// Data problems are reported as `{"error": ...}` with status 200 so the
/// page can show them; only a failure of the analysis itself is a 500.
pub async fn analyze(state: Arc<AppState>) -> ApiResponse {
    let worker = Arc::clone(&state);
    let outcome = tokio::task::spawn_blocking(move || worker.processor.process()).await;

    match outcome {
        Ok(Ok(report)) => json_response(StatusCode::OK, &report, cors(&state)),
        Ok(Err(e)) => analysis_error(&e, cors(&state)),
        Err(e) => {
            let message = format!("analysis service error: {e}");
            logger::log_error(&message);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &message, cors(&state))
        }
    }
}

fn analysis_error(error: &AnalysisError, enable_cors: bool) -> ApiResponse {
    logger::log_debug(&format!("Analysis not available: {error}"));
    error_response(StatusCode::OK, &error.to_string(), enable_cors)
}

/// `POST /start`
pub fn start_replay(state: &AppState) -> ApiResponse {
    match state.publisher.start() {
        Ok(()) => msg_response(StatusCode::OK, "started", cors(state)),
        Err(e) => control_error(&e, cors(state)),
    }
}

/// `POST /stop`
pub fn stop_replay(state: &AppState) -> ApiResponse {
    match state.publisher.stop() {
        Ok(()) => msg_response(StatusCode::OK, "stopped", cors(state)),
        Err(e) => control_error(&e, cors(state)),
    }
}

fn control_error(error: &ControlError, enable_cors: bool) -> ApiResponse {
    msg_response(StatusCode::BAD_REQUEST, &error.to_string(), enable_cors)
}

/// `GET /status`
pub fn replay_status(state: &AppState) -> ApiResponse {
    json_response(StatusCode::OK, &state.publisher.status(), cors(state))
}

/// `GET /api/routes`
pub fn routes(state: &AppState) -> ApiResponse {
    json_response(
        StatusCode::OK,
        &RoutesResponse {
            history: state.routes.history(),
            routes: state.routes.routes(),
        },
        cors(state),
    )
}
