// Server module entry
// Listeners, connection handling, live feed and shutdown signals

pub mod connection;
pub mod listener;
pub mod signal;
pub mod websocket;

// `loop` is a keyword, so the module is exposed as `server_loop`
#[path = "loop.rs"]
pub mod server_loop;

// Re-export commonly used items
pub use connection::ListenerKind;
pub use listener::create_reusable_listener;
pub use server_loop::start_server_loop;
pub use signal::start_signal_handler;
pub use websocket::start_ws_loop;
