// Connection handling module
// Serves one accepted TCP connection on the front-end or API listener

use http_body_util::Full;
use hyper::body::{Body, Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api;
use crate::config::AppState;
use crate::handler;
use crate::logger::{self, AccessLogEntry};

/// Which HTTP surface a listener exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    /// Single-page front-end
    Web,
    /// JSON management API
    Api,
}

impl ListenerKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Api => "api",
        }
    }
}

/// Accept a connection unless the listener is at its connection limit.
///
/// # Arguments
///
/// * `stream` - The TCP stream to handle
/// * `peer_addr` - The peer's socket address
/// * `state` - Shared application state
/// * `conn_counter` - Active connection counter of this listener
/// * `kind` - Surface served on this listener
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    conn_counter: &Arc<AtomicUsize>,
    kind: ListenerKind,
) {
    // Increment counter first, then check limit (prevents race condition)
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "[{}] Max connections reached: {prev_count}/{max_conn}. Connection rejected.",
                kind.name()
            ));
            drop(stream);
            return;
        }
    }

    logger::log_connection_accepted(&peer_addr);

    handle_connection(
        stream,
        peer_addr,
        Arc::clone(state),
        Arc::clone(conn_counter),
        kind,
    );
}

/// Serve the connection in a spawned task.
///
/// HTTP/1.1 with keep-alive; the whole connection is bounded by the
/// configured timeouts and is closed gracefully on shutdown.
fn handle_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
    conn_counter: Arc<AtomicUsize>,
    kind: ListenerKind,
) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);

        let perf = &state.config.performance;
        let timeout_duration = Duration::from_secs(
            perf.keep_alive_timeout
                .max(perf.read_timeout)
                .max(perf.write_timeout),
        );

        let mut builder = http1::Builder::new();
        builder
            .keep_alive(perf.keep_alive_timeout > 0)
            .timer(TokioTimer::new())
            .header_read_timeout(Duration::from_secs(perf.read_timeout));

        let service_state = Arc::clone(&state);
        let service = service_fn(move |req| {
            let state = Arc::clone(&service_state);
            async move { serve_request(req, state, peer_addr, kind).await }
        });

        let serve = async {
            let mut conn = pin!(builder.serve_connection(io, service));
            tokio::select! {
                result = conn.as_mut() => result,
                () = state.wait_for_shutdown() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            }
        };

        match tokio::time::timeout(timeout_duration, serve).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => logger::log_connection_error(&err),
            Err(_) => logger::log_debug(&format!(
                "[{}] Connection from {peer_addr} closed after {}s",
                kind.name(),
                timeout_duration.as_secs()
            )),
        }

        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}

/// Dispatch one request and write its access log line
async fn serve_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
    kind: ListenerKind,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let entry = state
        .access_log_enabled()
        .then(|| access_entry(&req, peer_addr, kind));

    let mut response = match kind {
        ListenerKind::Web => handler::handle_request(req, Arc::clone(&state)).await?,
        ListenerKind::Api => api::handle_api_request(req, Arc::clone(&state)).await?,
    };

    if let Ok(server) = state.config.http.server_name.parse() {
        response.headers_mut().insert(hyper::header::SERVER, server);
    }

    if let Some(mut entry) = entry {
        entry.status = response.status().as_u16();
        entry.body_bytes = response
            .body()
            .size_hint()
            .exact()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or_default();
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

fn access_entry<B>(req: &Request<B>, peer_addr: SocketAddr, kind: ListenerKind) -> AccessLogEntry {
    let header = |name: hyper::header::HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        kind.name(),
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = format!("{:?}", req.version())
        .trim_start_matches("HTTP/")
        .to_string();
    entry.referer = header(hyper::header::REFERER);
    entry.user_agent = header(hyper::header::USER_AGENT);
    entry
}
