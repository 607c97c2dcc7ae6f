//! Event-driven orchestration of the mapping pipeline.
//!
//! Every input change arrives as an [`Event`] on one channel and is handled to
//! completion before the next one: aggregation first, then the spatial binder,
//! then the floor filter. Mapping stages wait until a scene is available.

use crate::aggregation::series::{gauge_reading, room_totals, time_series};
use crate::aggregation::{Aggregate, Mode, Selection, compute_kpi, filter_records};
use crate::binder::{BindReport, Binder};
use crate::colormap::{Color, ColorRamp, DomainTable, normalize};
use crate::config::Config;
use crate::error::AppError;
use crate::feed::{ForecastRecord, Kpi, MonthFilter, SensorRecord};
use crate::scene::{Attachment, Scene, SceneGraph, TextureRef};
use crate::state::{AppState, ChartData, FeedStatus, KpiSnapshot, SceneView};
use crate::visibility::{FilterReport, FloorKeywords, FloorSelector, MaterialStyle, apply_floor_filter};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub mod loader;

pub use loader::{load_scene, load_texture, spawn_feed_reload_thread};

pub const EVENT_QUEUE_DEPTH: usize = 32;

/// Partial selection change; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionUpdate {
    pub kpi: Option<Kpi>,
    pub month: Option<MonthFilter>,
    pub mode: Option<Mode>,
}

impl SelectionUpdate {
    pub fn apply(&self, selection: Selection) -> Selection {
        Selection {
            kpi: self.kpi.unwrap_or(selection.kpi),
            month: self.month.unwrap_or(selection.month),
            mode: self.mode.unwrap_or(selection.mode),
        }
    }
}

#[derive(Debug)]
pub enum Event {
    RecordsLoaded(Vec<SensorRecord>),
    ForecastLoaded(Vec<ForecastRecord>),
    SelectionChanged(SelectionUpdate),
    FloorChanged(FloorSelector),
    SceneLoaded(Box<Scene>),
    TextureLoaded(TextureRef),
    SceneUnavailable(String),
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub gauge_domains: DomainTable,
    pub heatmap_domains: DomainTable,
    pub floor_keywords: FloorKeywords,
    pub material_style: MaterialStyle,
    pub ramp: ColorRamp,
    pub moving_average_window: usize,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            gauge_domains: config.domains.gauge.clone(),
            heatmap_domains: config.domains.heatmap.clone(),
            floor_keywords: config.floors.clone(),
            material_style: MaterialStyle::default(),
            ramp: ColorRamp::default(),
            moving_average_window: config.moving_average_window(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub value: f64,
    pub rooms: usize,
    /// Absent while the mapping stages are deferred.
    pub bind: Option<BindReport>,
    pub filter: Option<FilterReport>,
}

pub struct Engine {
    settings: EngineSettings,
    binder: Binder,
    state: Arc<RwLock<AppState>>,
    records: Vec<SensorRecord>,
    forecast: Vec<ForecastRecord>,
    selection: Selection,
    floor: FloorSelector,
    scene: Option<Scene>,
}

impl Engine {
    pub fn new(settings: EngineSettings, binder: Binder, state: Arc<RwLock<AppState>>) -> Self {
        Self {
            settings,
            binder,
            state,
            records: Vec::new(),
            forecast: Vec::new(),
            selection: Selection::default(),
            floor: FloorSelector::default(),
            scene: None,
        }
    }

    pub fn from_config(config: &Config, state: Arc<RwLock<AppState>>) -> Self {
        let binder = Binder::new(config.room_bindings(), config.anchors, config.overlay_style())
            .with_footprints(config.default_footprint(), config.footprint_overrides());
        Self::new(EngineSettings::from_config(config), binder, state)
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn floor(&self) -> FloorSelector {
        self.floor
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    /// Apply one input change and run every dependent stage.
    pub fn handle(&mut self, event: Event) -> Result<CycleReport, AppError> {
        match event {
            Event::RecordsLoaded(records) => {
                debug!(records = records.len(), "Sensor records loaded");
                self.records = records;
                self.publish_feed_status()?;
            }
            Event::ForecastLoaded(forecast) => {
                debug!(rows = forecast.len(), "Forecast rows loaded");
                self.forecast = forecast;
                self.publish_feed_status()?;
            }
            Event::SelectionChanged(update) => {
                self.selection = update.apply(self.selection);
                info!(
                    kpi = %self.selection.kpi,
                    month = %String::from(self.selection.month),
                    mode = ?self.selection.mode,
                    "Selection changed"
                );
            }
            Event::FloorChanged(floor) => {
                info!(floor = ?floor, "Floor selector changed");
                self.floor = floor;
            }
            Event::SceneLoaded(scene) => {
                info!(nodes = scene.len(), "Scene graph loaded");
                self.scene = Some(*scene);
            }
            Event::TextureLoaded(texture) => {
                info!(texture = %texture.0, "Decorative texture loaded");
                self.settings.material_style.decorative_texture = Some(texture);
            }
            Event::SceneUnavailable(reason) => {
                warn!(reason = %reason, "Scene graph unavailable, mapping stays deferred");
            }
        }
        self.recompute()
    }

    fn recompute(&mut self) -> Result<CycleReport, AppError> {
        let selection = self.selection;
        let aggregate = compute_kpi(&self.records, &self.forecast, &selection);
        let t = normalize(
            aggregate.scalar_average,
            self.settings.heatmap_domains.get(selection.kpi),
        );
        let ball_color = self.settings.ramp.color_for(t);
        let charts = self.chart_data(&selection);

        let mut report = CycleReport {
            value: aggregate.scalar_average,
            rooms: aggregate.per_room.len(),
            bind: None,
            filter: None,
        };

        let view = match self.scene.as_mut() {
            Some(scene) => {
                let bind = self.binder.refresh(
                    scene,
                    selection.kpi,
                    &aggregate.per_room,
                    &self.settings.heatmap_domains,
                );
                let filter = apply_floor_filter(
                    scene,
                    self.floor,
                    &self.settings.floor_keywords,
                    ball_color,
                    &self.settings.material_style,
                );
                debug!(
                    labels = bind.labels,
                    overlays = bind.overlays,
                    regenerated = bind.regenerated,
                    visible = filter.visible,
                    changed = filter.changed,
                    "Scene mapping updated"
                );
                report.bind = Some(bind);
                report.filter = Some(filter);
                Some(scene_view(scene, self.floor, filter))
            }
            None => {
                debug!("No scene loaded, deferring mapping stages");
                None
            }
        };

        self.publish(selection, aggregate, ball_color, charts, view)?;
        Ok(report)
    }

    fn chart_data(&self, selection: &Selection) -> ChartData {
        let filtered = filter_records(&self.records, &selection.month);
        ChartData {
            shares: room_totals(&self.records, selection.kpi),
            series: time_series(
                &filtered,
                selection.kpi,
                self.settings.moving_average_window,
            ),
        }
    }

    fn publish(
        &self,
        selection: Selection,
        aggregate: Aggregate,
        ball_color: Color,
        charts: ChartData,
        view: Option<SceneView>,
    ) -> Result<(), AppError> {
        let now = SystemTime::now();
        let snapshot = KpiSnapshot {
            selection,
            value: aggregate.scalar_average,
            gauge: gauge_reading(
                aggregate.scalar_average,
                selection.kpi,
                &self.settings.gauge_domains,
            ),
            ball_color,
            updated_at: now,
        };

        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.set_view(selection, self.floor);
        guard.set_kpi(snapshot);
        guard.set_rooms(aggregate.per_room);
        guard.set_charts(charts);
        if let Some(view) = view {
            guard.set_scene(view);
        }
        Ok(())
    }

    fn publish_feed_status(&self) -> Result<(), AppError> {
        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.set_feed(FeedStatus {
            records: self.records.len(),
            forecast: self.forecast.len(),
            updated_at: SystemTime::now(),
        });
        Ok(())
    }
}

fn scene_view(scene: &Scene, floor: FloorSelector, filter: FilterReport) -> SceneView {
    let mut labels = Vec::new();
    let mut overlays = Vec::new();
    for (_, attachment) in scene.attachments() {
        match attachment {
            Attachment::Label(label) => labels.push(label.clone()),
            Attachment::Overlay(overlay) => overlays.push(overlay.clone()),
        }
    }
    SceneView {
        floor,
        filter,
        labels,
        overlays,
        updated_at: SystemTime::now(),
    }
}

/// Drain the event channel until every sender is gone. A failed cycle is
/// logged and leaves the previously published state in place.
pub async fn run_engine(mut engine: Engine, mut events: mpsc::Receiver<Event>) {
    info!("Engine started");
    while let Some(event) = events.recv().await {
        if let Err(err) = engine.handle(event) {
            warn!(error = %err, "Engine cycle failed");
        }
    }
    info!("Engine stopped, event channel closed");
}
