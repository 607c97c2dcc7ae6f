use roomlens::binder::{AnchorOffsets, Binder, OverlayStyle, RoomBinding};
use roomlens::colormap::{DomainTable, KpiDomain, normalize};
use roomlens::engine::loader::load_feed_events;
use roomlens::engine::{Engine, EngineSettings, Event, SelectionUpdate};
use roomlens::error::AppError;
use roomlens::feed::file::JsonFileSource;
use roomlens::feed::mock::{MockRowSource, co2_row};
use roomlens::feed::{Kpi, MonthFilter, NormalizeOptions};
use roomlens::scene::{Aabb, Attachment, Footprint, Scene, SceneGraph};
use roomlens::state::AppState;
use roomlens::visibility::FloorSelector;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

fn settings(config: &roomlens::config::Config) -> EngineSettings {
    EngineSettings::from_config(config)
}

fn two_room_binder() -> Binder {
    let bindings = vec![
        RoomBinding {
            room_id: "A".to_string(),
            label_node: "RoomA".to_string(),
            floor_node: "RoomAFloor".to_string(),
        },
        RoomBinding {
            room_id: "B".to_string(),
            label_node: "RoomB".to_string(),
            floor_node: "RoomBFloor".to_string(),
        },
    ];
    Binder::new(bindings, AnchorOffsets::default(), OverlayStyle {
        texture_width: 8,
        texture_height: 8,
        ..OverlayStyle::default()
    })
    .with_footprints(Footprint::default(), HashMap::new())
}

fn two_room_scene() -> Scene {
    let mut scene = Scene::new();
    let second = scene.add_node(None, "SecondFloor", false, None);
    scene.add_node(
        Some(second),
        "RoomA",
        true,
        Some(Aabb::from_arrays([0.0, 4.0, 0.0], [4.0, 6.0, 4.0])),
    );
    scene.add_node(
        Some(second),
        "RoomAFloor",
        true,
        Some(Aabb::from_arrays([0.0, 3.9, 0.0], [4.0, 4.0, 4.0])),
    );
    // Room B has no node in this building.
    scene
}

#[test]
fn pipeline_mock_maps_feed_onto_scene() -> Result<(), Box<dyn std::error::Error>> {
    let config = roomlens::config::load_default()?;
    let state = Arc::new(RwLock::new(AppState::new()));
    let mut engine = Engine::new(settings(&config), two_room_binder(), Arc::clone(&state));
    let mut source = MockRowSource::with_rows(
        vec![
            co2_row("A", "2024-01-15 10:00:00", 800.0),
            co2_row("A", "2024-02-15 10:00:00", 1000.0),
            co2_row("B", "2024-01-16 10:00:00", 200.0),
        ],
        Vec::new(),
    );

    for event in load_feed_events(&mut source, NormalizeOptions::default()) {
        engine.handle(event)?;
    }
    let report = engine.handle(Event::SceneLoaded(Box::new(two_room_scene())))?;

    assert!((report.value - 666.67).abs() < 0.01);
    let guard = state.read().map_err(|_| AppError::StateLock)?;
    assert_eq!(guard.rooms().get("A"), Some(&900.0));
    assert_eq!(guard.rooms().get("B"), Some(&200.0));
    let intensity = normalize(guard.rooms()["A"], KpiDomain::new(0.0, 1000.0));
    assert!((intensity - 0.9).abs() < 1e-9);

    let view = guard.scene().ok_or("scene view missing")?;
    assert_eq!(view.labels.len(), 1);
    assert_eq!(view.labels[0].text, "900.00");
    assert_eq!(view.overlays.len(), 1);
    assert_eq!(view.overlays[0].node_name, "RoomAFloor");
    Ok(())
}

#[test]
fn pipeline_mock_month_filter_leaves_room_table_alone() -> Result<(), Box<dyn std::error::Error>> {
    let config = roomlens::config::load_default()?;
    let state = Arc::new(RwLock::new(AppState::new()));
    let mut engine = Engine::new(settings(&config), two_room_binder(), Arc::clone(&state));
    let mut source = MockRowSource::with_rows(
        vec![
            co2_row("A", "2024-01-15", 100.0),
            co2_row("A", "2024-02-15", 300.0),
        ],
        Vec::new(),
    );
    for event in load_feed_events(&mut source, NormalizeOptions::default()) {
        engine.handle(event)?;
    }

    let january = engine.handle(Event::SelectionChanged(SelectionUpdate {
        month: Some("January".parse::<MonthFilter>()?),
        ..SelectionUpdate::default()
    }))?;
    let december = engine.handle(Event::SelectionChanged(SelectionUpdate {
        month: Some("December".parse::<MonthFilter>()?),
        ..SelectionUpdate::default()
    }))?;

    assert_eq!(january.value, 100.0);
    assert_eq!(december.value, 0.0);
    let guard = state.read().map_err(|_| AppError::StateLock)?;
    assert_eq!(guard.rooms().get("A"), Some(&200.0));
    Ok(())
}

#[test]
fn pipeline_mock_feed_outage_keeps_previous_values() -> Result<(), Box<dyn std::error::Error>> {
    let config = roomlens::config::load_default()?;
    let state = Arc::new(RwLock::new(AppState::new()));
    let mut engine = Engine::new(settings(&config), two_room_binder(), Arc::clone(&state));
    let mut healthy = MockRowSource::with_rows(vec![co2_row("A", "2024-01-15", 640.0)], Vec::new());
    for event in load_feed_events(&mut healthy, NormalizeOptions::default()) {
        engine.handle(event)?;
    }

    let events = load_feed_events(&mut MockRowSource::unavailable(), NormalizeOptions::default());

    assert!(events.is_empty());
    let guard = state.read().map_err(|_| AppError::StateLock)?;
    assert_eq!(guard.kpi().map(|kpi| kpi.value), Some(640.0));
    Ok(())
}

#[test]
fn sample_building_binds_every_configured_room() -> Result<(), Box<dyn std::error::Error>> {
    let config = roomlens::config::load_default()?;
    let state = Arc::new(RwLock::new(AppState::new()));
    let mut engine = Engine::from_config(&config, Arc::clone(&state));
    let records_path = config.records_path().ok_or("records path missing")?;
    let scene_path = config.scene_path().ok_or("scene path missing")?;
    let mut source = JsonFileSource::new(records_path, config.forecast_path().map(|p| p.to_path_buf()));

    for event in load_feed_events(&mut source, config.normalize_options()) {
        engine.handle(event)?;
    }
    engine.handle(Event::SceneLoaded(Box::new(Scene::load(scene_path)?)))?;
    let report = engine.handle(Event::FloorChanged(FloorSelector::First))?;

    // Room 5 has a room mesh but no floor mesh in the sample building.
    let scene = engine.scene().ok_or("scene missing")?;
    let (labels, overlays) = scene
        .attachments()
        .iter()
        .fold((0, 0), |(labels, overlays), (_, item)| match item {
            Attachment::Label(_) => (labels + 1, overlays),
            Attachment::Overlay(_) => (labels, overlays + 1),
        });
    assert_eq!(labels, 5);
    assert_eq!(overlays, 4);
    let filter = report.filter.ok_or("filter did not run")?;
    assert_eq!(filter.visible, 3);
    let guard = state.read().map_err(|_| AppError::StateLock)?;
    assert_eq!(guard.selection().kpi, Kpi::Co2);
    assert_eq!(DomainTable::heatmap_defaults(), config.domains.heatmap);
    Ok(())
}
