use std::sync::Arc;

use sensor_console::config::{AppState, Config};
use sensor_console::logger;
use sensor_console::server::{self, ListenerKind};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Config path without extension; `config` picks up config.toml, config.json, ...
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let cfg = Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    // Create Tokio runtime, thread count from `server.workers` when set
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    let web_addr = cfg.web_socket_addr()?;
    let api_addr = cfg.api_socket_addr()?;
    let ws_addr = cfg.ws_socket_addr()?;

    let state = Arc::new(AppState::new(&cfg)?);
    state.store.ensure()?;

    let web_listener = server::create_reusable_listener(web_addr)?;
    let api_listener = server::create_reusable_listener(api_addr)?;
    let ws_listener = server::create_reusable_listener(ws_addr)?;
    for (name, listener) in [("web", &web_listener), ("api", &api_listener), ("ws", &ws_listener)] {
        logger::log_listener_bound(name, &listener.local_addr()?);
    }
    logger::log_server_start(&web_addr, &api_addr, &ws_addr, &cfg);

    server::start_signal_handler(Arc::clone(&state));

    if cfg.mqtt.auto_connect {
        // A missing broker must not keep the dashboard from starting
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = state.subscriber.connect().await {
                logger::log_warning(&format!("Initial MQTT connect failed: {e}"));
            }
        });
    }

    let web = tokio::spawn(server::start_server_loop(
        web_listener,
        Arc::clone(&state),
        ListenerKind::Web,
    ));
    let api = tokio::spawn(server::start_server_loop(
        api_listener,
        Arc::clone(&state),
        ListenerKind::Api,
    ));
    let ws = tokio::spawn(server::start_ws_loop(ws_listener, Arc::clone(&state)));

    state.wait_for_shutdown().await;

    state.publisher.shutdown().await;
    state.subscriber.disconnect().await;

    for (name, task) in [("web", web), ("api", api), ("ws", ws)] {
        if let Err(e) = task.await {
            logger::log_error(&format!("[{name}] Listener task failed: {e}"));
        }
    }

    logger::log_info("[Shutdown] Complete");
    Ok(())
}
