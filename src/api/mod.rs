use crate::engine::Event;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, put};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

pub mod handlers;
pub mod responses;

/// Shared by every handler: read access to published state and the engine's
/// event queue for selector changes.
#[derive(Clone)]
pub struct ApiContext {
    pub state: Arc<RwLock<AppState>>,
    pub events: mpsc::Sender<Event>,
}

impl ApiContext {
    pub fn new(state: Arc<RwLock<AppState>>, events: mpsc::Sender<Event>) -> Self {
        Self { state, events }
    }
}

pub fn router(context: ApiContext) -> Router {
    Router::new()
        .route("/api/health", get(handlers::get_health))
        .route("/api/kpi", get(handlers::get_kpi))
        .route("/api/rooms", get(handlers::get_rooms))
        .route("/api/rooms/share", get(handlers::get_room_shares))
        .route("/api/series", get(handlers::get_series))
        .route("/api/months", get(handlers::get_months))
        .route("/api/scene", get(handlers::get_scene))
        .route(
            "/api/overlays/{node}/texture.png",
            get(handlers::get_overlay_texture),
        )
        .route("/api/selection", put(handlers::put_selection))
        .with_state(context)
}
