use roomlens::engine::{self, EVENT_QUEUE_DEPTH, Engine};
use roomlens::feed::file::JsonFileSource;
use roomlens::{api, config, state};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level());
    tracing::info!(
        app = %config.app.name,
        config_path = config::DEFAULT_CONFIG_PATH,
        "roomlens starting"
    );

    let state = Arc::new(RwLock::new(state::AppState::new()));
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let engine = Engine::from_config(&config, Arc::clone(&state));
    let engine_handle = tokio::spawn(engine::run_engine(engine, events_rx));

    // Scene and texture load in the background; mapping waits for them.
    match config.scene_path() {
        Some(path) => {
            let events = events_tx.clone();
            let path = path.to_path_buf();
            tokio::spawn(async move {
                let event = engine::load_scene(path).await;
                if events.send(event).await.is_err() {
                    tracing::warn!("Engine stopped before the scene arrived");
                }
            });
        }
        None => tracing::warn!("No scene configured in [data].scene_path, mapping disabled"),
    }
    if let Some(path) = config.texture_path() {
        let events = events_tx.clone();
        let path = path.to_path_buf();
        tokio::spawn(async move {
            if let Some(event) = engine::load_texture(path).await
                && events.send(event).await.is_err()
            {
                tracing::warn!("Engine stopped before the texture arrived");
            }
        });
    }

    let stop_flag = Arc::new(AtomicBool::new(false));
    let _reload_handle = match config.records_path() {
        Some(path) => {
            let source = JsonFileSource::new(path, config.forecast_path().map(|p| p.to_path_buf()));
            tracing::info!(
                path = %path.display(),
                interval_secs = config.reload_interval().as_secs(),
                "Starting feed reload thread"
            );
            Some(engine::spawn_feed_reload_thread(
                source,
                config.normalize_options(),
                events_tx.clone(),
                config.reload_interval(),
                Arc::clone(&stop_flag),
            ))
        }
        None => {
            tracing::warn!("No sensor feed configured in [data].records_path");
            None
        }
    };

    let app = api::router(api::ApiContext::new(Arc::clone(&state), events_tx));
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    stop_flag.store(true, Ordering::Relaxed);
    engine_handle.abort();

    Ok(())
}
