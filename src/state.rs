use crate::aggregation::Selection;
use crate::aggregation::series::{GaugeReading, RoomShare, SeriesPoint};
use crate::colormap::Color;
use crate::feed::RoomId;
use crate::scene::{HeatmapOverlay, Label};
use crate::visibility::{FilterReport, FloorSelector};
use std::collections::BTreeMap;
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq)]
pub struct FeedStatus {
    pub records: usize,
    pub forecast: usize,
    pub updated_at: SystemTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KpiSnapshot {
    pub selection: Selection,
    pub value: f64,
    pub gauge: GaugeReading,
    /// Color of the sensor ball meshes for this value.
    pub ball_color: Color,
    pub updated_at: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChartData {
    pub shares: Vec<RoomShare>,
    pub series: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneView {
    pub floor: FloorSelector,
    pub filter: FilterReport,
    pub labels: Vec<Label>,
    pub overlays: Vec<HeatmapOverlay>,
    pub updated_at: SystemTime,
}

impl SceneView {
    pub fn overlay_for_node(&self, node_name: &str) -> Option<&HeatmapOverlay> {
        self.overlays
            .iter()
            .find(|overlay| overlay.node_name == node_name)
    }
}

/// Latest published outputs of the engine. Every slot is replaced wholesale,
/// so readers never see half of an update.
#[derive(Debug)]
pub struct AppState {
    selection: Selection,
    floor: FloorSelector,
    feed: Option<FeedStatus>,
    kpi: Option<KpiSnapshot>,
    rooms: BTreeMap<RoomId, f64>,
    charts: ChartData,
    scene: Option<SceneView>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            selection: Selection::default(),
            floor: FloorSelector::default(),
            feed: None,
            kpi: None,
            rooms: BTreeMap::new(),
            charts: ChartData::default(),
            scene: None,
        }
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn floor(&self) -> FloorSelector {
        self.floor
    }

    pub fn set_view(&mut self, selection: Selection, floor: FloorSelector) {
        self.selection = selection;
        self.floor = floor;
    }

    pub fn feed(&self) -> Option<&FeedStatus> {
        self.feed.as_ref()
    }

    pub fn set_feed(&mut self, feed: FeedStatus) {
        self.feed = Some(feed);
    }

    pub fn kpi(&self) -> Option<&KpiSnapshot> {
        self.kpi.as_ref()
    }

    pub fn set_kpi(&mut self, snapshot: KpiSnapshot) {
        self.kpi = Some(snapshot);
    }

    pub fn rooms(&self) -> &BTreeMap<RoomId, f64> {
        &self.rooms
    }

    pub fn set_rooms(&mut self, rooms: BTreeMap<RoomId, f64>) {
        self.rooms = rooms;
    }

    pub fn charts(&self) -> &ChartData {
        &self.charts
    }

    pub fn set_charts(&mut self, charts: ChartData) {
        self.charts = charts;
    }

    pub fn scene(&self) -> Option<&SceneView> {
        self.scene.as_ref()
    }

    pub fn set_scene(&mut self, view: SceneView) {
        self.scene = Some(view);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Kpi, MonthFilter};
    use std::time::{Duration, UNIX_EPOCH};

    fn snapshot(value: f64) -> KpiSnapshot {
        KpiSnapshot {
            selection: Selection::default(),
            value,
            gauge: GaugeReading {
                percent: value / 1000.0,
                text: format!("{value:.1} CO2"),
            },
            ball_color: Color::GREEN,
            updated_at: UNIX_EPOCH + Duration::from_secs(1),
        }
    }

    #[test]
    fn set_kpi_replaces_previous_snapshot() {
        let mut state = AppState::new();
        assert!(state.kpi().is_none());

        state.set_kpi(snapshot(640.0));
        state.set_kpi(snapshot(666.67));

        assert_eq!(state.kpi(), Some(&snapshot(666.67)));
    }

    #[test]
    fn set_rooms_stores_table() {
        let mut state = AppState::new();
        let table = BTreeMap::from([("A".to_string(), 900.0), ("B".to_string(), 200.0)]);

        state.set_rooms(table.clone());

        assert_eq!(state.rooms(), &table);
    }

    #[test]
    fn view_defaults_to_select_all_and_every_floor() {
        let mut state = AppState::new();
        assert_eq!(state.selection().month, MonthFilter::All);
        assert_eq!(state.floor(), FloorSelector::All);

        let selection = Selection {
            kpi: Kpi::Humidity,
            ..Selection::default()
        };
        state.set_view(selection, FloorSelector::Second);

        assert_eq!(state.selection().kpi, Kpi::Humidity);
        assert_eq!(state.floor(), FloorSelector::Second);
    }
}
