// WebSocket fan-out module
// Pushes every received reading to all connected browsers

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::Message;

use crate::config::AppState;
use crate::logger;

/// Accept WebSocket clients until shutdown is requested
pub async fn start_ws_loop(listener: TcpListener, state: Arc<AppState>) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        tokio::spawn(serve_client(stream, peer_addr, Arc::clone(&state)));
                    }
                    Err(e) => logger::log_error(&format!("[ws] Failed to accept connection: {e}")),
                }
            }

            () = state.wait_for_shutdown() => {
                logger::log_info("[ws] Listener closed");
                break;
            }
        }
    }
}

/// Forward hub messages to one client; inbound frames are read and dropped
async fn serve_client(stream: TcpStream, peer_addr: SocketAddr, state: Arc<AppState>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            logger::log_debug(&format!("[WS] Handshake with {peer_addr} failed: {e}"));
            return;
        }
    };

    // Subscribe before registering so nothing broadcast after the count rises is missed
    let mut feed = state.hub.subscribe();
    let guard = state.hub.register_client();
    logger::log_ws_client_connected(&peer_addr, state.hub.client_count());

    let (mut sink, mut inbound) = ws.split();
    loop {
        tokio::select! {
            message = feed.recv() => match message {
                Ok(text) => {
                    if let Err(e) = sink.send(Message::Text(text.to_string())).await {
                        logger::log_debug(&format!("[WS] Send to {peer_addr} failed: {e}"));
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    logger::log_warning(&format!("[WS] {peer_addr} lagging, skipped {skipped} messages"));
                }
                Err(RecvError::Closed) => break,
            },

            frame = inbound.next() => match frame {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },

            () = state.wait_for_shutdown() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    drop(guard);
    logger::log_ws_client_closed(&peer_addr, state.hub.client_count());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::create_reusable_listener;
    use std::time::Duration;

    #[tokio::test]
    async fn test_broadcast_reaches_client() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::load_from("__no_such_config__").unwrap();
        config.storage.data_dir = dir.path().to_string_lossy().into_owned();
        let state = Arc::new(AppState::new(&config).unwrap());

        let listener = create_reusable_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(start_ws_loop(listener, Arc::clone(&state)));

        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();

        for _ in 0..100 {
            if state.hub.client_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.hub.client_count(), 1);

        state.hub.broadcast(r#"{"temperature":21.5}"#);
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(frame, Message::Text(r#"{"temperature":21.5}"#.to_string()));

        client.close(None).await.unwrap();
        for _ in 0..100 {
            if state.hub.client_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.hub.client_count(), 0);

        state.request_shutdown();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
    }
}
