use crate::aggregation::Mode;
use crate::aggregation::series::{RoomShare, SeriesPoint};
use crate::feed::{Kpi, MonthFilter};
use crate::scene::Footprint;
use crate::visibility::FloorSelector;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Ko,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub records: usize,
    pub scene_loaded: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct KpiSuccessResponse {
    pub kpi: Kpi,
    pub month: MonthFilter,
    pub mode: Mode,
    pub value: f64,
    pub gauge_percent: f64,
    pub gauge_text: String,
    pub ball_color: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RoomValueResponse {
    pub room_id: String,
    pub value: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RoomsSuccessResponse {
    pub kpi: Kpi,
    pub rooms: Vec<RoomValueResponse>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SharesSuccessResponse {
    pub kpi: Kpi,
    pub shares: Vec<RoomShare>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SeriesSuccessResponse {
    pub kpi: Kpi,
    pub month: MonthFilter,
    pub points: Vec<SeriesPoint>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct MonthsSuccessResponse {
    pub months: Vec<&'static str>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct LabelResponse {
    pub room_id: String,
    pub node: String,
    pub text: String,
    pub position: [f64; 3],
    pub font_size: f32,
    pub color: String,
    pub font_weight: u16,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct OverlayResponse {
    pub room_id: String,
    pub node: String,
    pub value: f64,
    pub position: [f64; 3],
    pub rotation_x: f64,
    pub size: Footprint,
    pub opacity: f32,
    pub double_sided: bool,
    pub texture_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SceneSuccessResponse {
    pub floor: FloorSelector,
    pub meshes: usize,
    pub visible_meshes: usize,
    pub labels: Vec<LabelResponse>,
    pub overlays: Vec<OverlayResponse>,
    pub timestamp: String,
}

/// Body of `PUT /api/selection`; absent fields keep their current value.
/// Every field stays a string so bad values are reported as
/// `INVALID_SELECTION` rather than rejected by the extractor.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SelectionRequest {
    pub kpi: Option<String>,
    pub month: Option<String>,
    pub mode: Option<String>,
    pub floor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SelectionAcceptedResponse {
    pub accepted: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ApiErrorResponse {
    pub error_code: ApiErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    NoData,
    NotFound,
    InvalidSelection,
    EngineUnavailable,
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_response_uses_screaming_snake_case_code() {
        let response = ApiErrorResponse {
            error_code: ApiErrorCode::InvalidSelection,
            error_message: "unknown month: Smarch".to_string(),
            timestamp: "2026-01-11T12:32:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize error response");
        assert_eq!(
            value,
            json!({
                "error_code": "INVALID_SELECTION",
                "error_message": "unknown month: Smarch",
                "timestamp": "2026-01-11T12:32:00Z"
            })
        );
    }

    #[test]
    fn kpi_response_uses_dashboard_wire_names() {
        let response = KpiSuccessResponse {
            kpi: Kpi::Co2,
            month: MonthFilter::All,
            mode: Mode::Historical,
            value: 666.67,
            gauge_percent: 0.67,
            gauge_text: "666.7 CO2".to_string(),
            ball_color: "#ab5500".to_string(),
            timestamp: "2026-01-11T12:30:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize kpi response");
        assert_eq!(
            value,
            json!({
                "kpi": "CO2",
                "month": "Select All",
                "mode": "Historical",
                "value": 666.67,
                "gauge_percent": 0.67,
                "gauge_text": "666.7 CO2",
                "ball_color": "#ab5500",
                "timestamp": "2026-01-11T12:30:00Z"
            })
        );
    }

    #[test]
    fn health_response_serializes_status() {
        let response = HealthSuccessResponse {
            status: HealthStatus::Degraded,
            records: 3,
            scene_loaded: false,
            timestamp: "2026-01-11T12:33:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize health response");
        assert_eq!(
            value,
            json!({
                "status": "degraded",
                "records": 3,
                "scene_loaded": false,
                "timestamp": "2026-01-11T12:33:00Z"
            })
        );
    }

    #[test]
    fn selection_request_accepts_partial_body() -> Result<(), serde_json::Error> {
        let request: SelectionRequest = serde_json::from_str(r#"{"floor": "2nd"}"#)?;

        assert_eq!(request.floor.as_deref(), Some("2nd"));
        assert!(request.kpi.is_none());
        assert!(request.month.is_none());
        Ok(())
    }
}
