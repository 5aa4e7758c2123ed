// Server loop module
// Accept loop shared by the front-end and API listeners

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::connection::{accept_connection, ListenerKind};
use crate::config::AppState;
use crate::logger;

/// Accept connections until shutdown is requested
///
/// In-flight connections are not awaited here; each one closes itself
/// gracefully when it observes the same shutdown notification.
pub async fn start_server_loop(listener: TcpListener, state: Arc<AppState>, kind: ListenerKind) {
    let active_connections = Arc::new(AtomicUsize::new(0));

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &active_connections, kind);
                    }
                    Err(e) => {
                        logger::log_error(&format!("[{}] Failed to accept connection: {e}", kind.name()));
                    }
                }
            }

            () = state.wait_for_shutdown() => {
                logger::log_info(&format!("[{}] Listener closed", kind.name()));
                break;
            }
        }
    }
}
