use crate::aggregation::Mode;
use crate::api::ApiContext;
use crate::api::responses::{
    ApiErrorCode, ApiErrorResponse, HealthStatus, HealthSuccessResponse, KpiSuccessResponse,
    LabelResponse, MonthsSuccessResponse, OverlayResponse, RoomValueResponse,
    RoomsSuccessResponse, SceneSuccessResponse, SelectionAcceptedResponse, SelectionRequest,
    SeriesSuccessResponse, SharesSuccessResponse,
};
use crate::colormap::gradient::encode_png;
use crate::engine::{Event, SelectionUpdate};
use crate::error::AppError;
use crate::feed::{Kpi, MonthFilter, month_options};
use crate::scene::{HeatmapOverlay, Label};
use crate::state::AppState;
use crate::visibility::FloorSelector;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use std::sync::RwLock;
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, info};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum ApiResponse<T> {
    Success {
        status: StatusCode,
        body: T,
    },
    Error {
        status: StatusCode,
        body: ApiErrorResponse,
    },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success { status, body } => (status, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub enum TextureResponse {
    Png(Vec<u8>),
    Error {
        status: StatusCode,
        body: ApiErrorResponse,
    },
}

impl IntoResponse for TextureResponse {
    fn into_response(self) -> Response {
        match self {
            TextureResponse::Png(bytes) => {
                (StatusCode::OK, [(header::CONTENT_TYPE, "image/png")], bytes).into_response()
            }
            TextureResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(ctx): State<ApiContext>) -> impl IntoResponse {
    build_health_response(&ctx.state, SystemTime::now())
}

pub async fn get_kpi(State(ctx): State<ApiContext>) -> impl IntoResponse {
    build_kpi_response(&ctx.state)
}

pub async fn get_rooms(State(ctx): State<ApiContext>) -> impl IntoResponse {
    build_rooms_response(&ctx.state, SystemTime::now())
}

pub async fn get_room_shares(State(ctx): State<ApiContext>) -> impl IntoResponse {
    build_shares_response(&ctx.state, SystemTime::now())
}

pub async fn get_series(State(ctx): State<ApiContext>) -> impl IntoResponse {
    build_series_response(&ctx.state, SystemTime::now())
}

pub async fn get_months() -> impl IntoResponse {
    build_months_response()
}

pub async fn get_scene(State(ctx): State<ApiContext>) -> impl IntoResponse {
    build_scene_response(&ctx.state)
}

pub async fn get_overlay_texture(
    State(ctx): State<ApiContext>,
    Path(node): Path<String>,
) -> impl IntoResponse {
    build_texture_response(&ctx.state, &node)
}

pub async fn put_selection(
    State(ctx): State<ApiContext>,
    Json(request): Json<SelectionRequest>,
) -> ApiResponse<SelectionAcceptedResponse> {
    let now = SystemTime::now();
    let events = match selection_events(request) {
        Ok(events) => events,
        Err(err) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                ApiErrorCode::InvalidSelection,
                &err.to_string(),
                now,
            );
        }
    };
    for event in events {
        if ctx.events.send(event).await.is_err() {
            error!("Engine channel closed while forwarding selection");
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorCode::EngineUnavailable,
                &AppError::EngineClosed.to_string(),
                now,
            );
        }
    }
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: StatusCode::ACCEPTED,
            body: SelectionAcceptedResponse {
                accepted: true,
                timestamp,
            },
        },
        Err(_err) => internal_error("/api/selection", "timestamp formatting failure"),
    }
}

/// Validate a selection request and turn it into engine events.
pub fn selection_events(request: SelectionRequest) -> Result<Vec<Event>, AppError> {
    let kpi = request
        .kpi
        .as_deref()
        .map(str::parse::<Kpi>)
        .transpose()
        .map_err(|err| AppError::InvalidSelection(err.to_string()))?;
    let month = request
        .month
        .as_deref()
        .map(str::parse::<MonthFilter>)
        .transpose()
        .map_err(|err| AppError::InvalidSelection(err.to_string()))?;
    let mode = request
        .mode
        .as_deref()
        .map(str::parse::<Mode>)
        .transpose()
        .map_err(AppError::InvalidSelection)?;
    let floor = request
        .floor
        .as_deref()
        .map(str::parse::<FloorSelector>)
        .transpose()
        .map_err(AppError::InvalidSelection)?;

    let mut events = Vec::with_capacity(2);
    let update = SelectionUpdate {
        kpi,
        month,
        mode,
    };
    if update != SelectionUpdate::default() {
        info!(update = ?update, "Selection update accepted");
        events.push(Event::SelectionChanged(update));
    }
    if let Some(floor) = floor {
        events.push(Event::FloorChanged(floor));
    }
    if events.is_empty() {
        return Err(AppError::InvalidSelection(
            "request changes nothing".to_string(),
        ));
    }
    Ok(events)
}

fn build_health_response(
    state: &RwLock<AppState>,
    now: SystemTime,
) -> ApiResponse<HealthSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/health", "state lock poisoned while reading status");
        }
    };
    let records = guard.feed().map_or(0, |feed| feed.records);
    let scene_loaded = guard.scene().is_some();
    drop(guard);

    let status = match (records, scene_loaded) {
        (0, _) => HealthStatus::Ko,
        (_, false) => HealthStatus::Degraded,
        (_, true) => HealthStatus::Ok,
    };
    let status_code = match status {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: status_code,
            body: HealthSuccessResponse {
                status,
                records,
                scene_loaded,
                timestamp,
            },
        },
        Err(_err) => internal_error("/api/health", "timestamp formatting failure"),
    }
}

fn build_kpi_response(state: &RwLock<AppState>) -> ApiResponse<KpiSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/kpi", "state lock poisoned while reading kpi");
        }
    };
    let snapshot = guard.kpi().cloned();
    drop(guard);

    let Some(snapshot) = snapshot else {
        return no_data_response("No KPI value available", SystemTime::now());
    };
    match format_timestamp(snapshot.updated_at) {
        Ok(timestamp) => ApiResponse::Success {
            status: StatusCode::OK,
            body: KpiSuccessResponse {
                kpi: snapshot.selection.kpi,
                month: snapshot.selection.month,
                mode: snapshot.selection.mode,
                value: snapshot.value,
                gauge_percent: snapshot.gauge.percent,
                gauge_text: snapshot.gauge.text,
                ball_color: snapshot.ball_color.to_hex(),
                timestamp,
            },
        },
        Err(_err) => internal_error("/api/kpi", "timestamp formatting failure"),
    }
}

fn build_rooms_response(
    state: &RwLock<AppState>,
    now: SystemTime,
) -> ApiResponse<RoomsSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/rooms", "state lock poisoned while reading rooms");
        }
    };
    if guard.kpi().is_none() {
        drop(guard);
        return no_data_response("No room table available", now);
    }
    let kpi = guard.selection().kpi;
    let rooms: Vec<RoomValueResponse> = guard
        .rooms()
        .iter()
        .map(|(room_id, value)| RoomValueResponse {
            room_id: room_id.clone(),
            value: *value,
        })
        .collect();
    drop(guard);

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: StatusCode::OK,
            body: RoomsSuccessResponse {
                kpi,
                rooms,
                timestamp,
            },
        },
        Err(_err) => internal_error("/api/rooms", "timestamp formatting failure"),
    }
}

fn build_shares_response(
    state: &RwLock<AppState>,
    now: SystemTime,
) -> ApiResponse<SharesSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/rooms/share", "state lock poisoned while reading charts");
        }
    };
    if guard.kpi().is_none() {
        drop(guard);
        return no_data_response("No chart data available", now);
    }
    let kpi = guard.selection().kpi;
    let shares = guard.charts().shares.clone();
    drop(guard);

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: StatusCode::OK,
            body: SharesSuccessResponse {
                kpi,
                shares,
                timestamp,
            },
        },
        Err(_err) => internal_error("/api/rooms/share", "timestamp formatting failure"),
    }
}

fn build_series_response(
    state: &RwLock<AppState>,
    now: SystemTime,
) -> ApiResponse<SeriesSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/series", "state lock poisoned while reading charts");
        }
    };
    if guard.kpi().is_none() {
        drop(guard);
        return no_data_response("No chart data available", now);
    }
    let selection = guard.selection();
    let points = guard.charts().series.clone();
    drop(guard);

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: StatusCode::OK,
            body: SeriesSuccessResponse {
                kpi: selection.kpi,
                month: selection.month,
                points,
                timestamp,
            },
        },
        Err(_err) => internal_error("/api/series", "timestamp formatting failure"),
    }
}

fn build_months_response() -> ApiResponse<MonthsSuccessResponse> {
    ApiResponse::Success {
        status: StatusCode::OK,
        body: MonthsSuccessResponse {
            months: month_options(),
        },
    }
}

fn build_scene_response(state: &RwLock<AppState>) -> ApiResponse<SceneSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/scene", "state lock poisoned while reading scene");
        }
    };
    let view = guard.scene().map(|view| {
        (
            view.floor,
            view.filter,
            view.labels.iter().map(label_response).collect::<Vec<_>>(),
            view.overlays.iter().map(overlay_response).collect::<Vec<_>>(),
            view.updated_at,
        )
    });
    drop(guard);

    let Some((floor, filter, labels, overlays, updated_at)) = view else {
        return no_data_response("Scene not loaded", SystemTime::now());
    };
    match format_timestamp(updated_at) {
        Ok(timestamp) => ApiResponse::Success {
            status: StatusCode::OK,
            body: SceneSuccessResponse {
                floor,
                meshes: filter.meshes,
                visible_meshes: filter.visible,
                labels,
                overlays,
                timestamp,
            },
        },
        Err(_err) => internal_error("/api/scene", "timestamp formatting failure"),
    }
}

fn label_response(label: &Label) -> LabelResponse {
    LabelResponse {
        room_id: label.room_id.clone(),
        node: label.node_name.clone(),
        text: label.text.clone(),
        position: [label.position.x, label.position.y, label.position.z],
        font_size: label.style.font_size,
        color: label.style.color.to_hex(),
        font_weight: label.style.font_weight,
    }
}

fn overlay_response(overlay: &HeatmapOverlay) -> OverlayResponse {
    OverlayResponse {
        room_id: overlay.room_id.clone(),
        node: overlay.node_name.clone(),
        value: overlay.value,
        position: [overlay.position.x, overlay.position.y, overlay.position.z],
        rotation_x: overlay.rotation_x,
        size: overlay.size,
        opacity: overlay.opacity,
        double_sided: overlay.double_sided,
        texture_url: format!(
            "/api/overlays/{}/texture.png",
            encode_path_segment(&overlay.node_name)
        ),
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(char::from(byte));
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn build_texture_response(state: &RwLock<AppState>, node: &str) -> TextureResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return texture_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorCode::InternalError,
                INTERNAL_ERROR_MESSAGE,
            );
        }
    };
    let texture = guard
        .scene()
        .and_then(|view| view.overlay_for_node(node))
        .map(|overlay| overlay.texture.clone());
    drop(guard);

    let Some(texture) = texture else {
        return texture_error(
            StatusCode::NOT_FOUND,
            ApiErrorCode::NotFound,
            &format!("No overlay attached to {node}"),
        );
    };
    match encode_png(&texture) {
        Ok(bytes) => TextureResponse::Png(bytes),
        Err(err) => {
            error!(node = node, error = %err, "Failed to encode overlay texture");
            texture_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorCode::InternalError,
                INTERNAL_ERROR_MESSAGE,
            )
        }
    }
}

fn texture_error(status: StatusCode, code: ApiErrorCode, message: &str) -> TextureResponse {
    TextureResponse::Error {
        status,
        body: ApiErrorResponse {
            error_code: code,
            error_message: message.to_string(),
            timestamp: now_or_epoch(),
        },
    }
}

fn no_data_response<T>(message: &str, now: SystemTime) -> ApiResponse<T> {
    error_response(StatusCode::SERVICE_UNAVAILABLE, ApiErrorCode::NoData, message, now)
}

fn error_response<T>(
    status: StatusCode,
    code: ApiErrorCode,
    message: &str,
    now: SystemTime,
) -> ApiResponse<T> {
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Error {
            status,
            body: ApiErrorResponse {
                error_code: code,
                error_message: message.to_string(),
                timestamp,
            },
        },
        Err(_err) => internal_error("error response", "timestamp formatting failure"),
    }
}

fn internal_error<T>(route: &str, message: &str) -> ApiResponse<T> {
    error!(route = route, message = message, "Internal error while handling request");
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ApiErrorResponse {
            error_code: ApiErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: now_or_epoch(),
        },
    }
}

fn now_or_epoch() -> String {
    format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    })
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}
