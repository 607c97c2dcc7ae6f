use crate::engine::Event;
use crate::feed::{NormalizeOptions, RowSource, normalize_forecast_rows, normalize_rows};
use crate::scene::{Scene, TextureRef};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Read both feeds once and turn them into engine events. A feed that fails
/// to load produces no event, so the engine keeps its previous rows.
pub fn load_feed_events<R: RowSource>(source: &mut R, options: NormalizeOptions) -> Vec<Event> {
    let mut events = Vec::with_capacity(2);
    match source.load_records() {
        Ok(rows) => events.push(Event::RecordsLoaded(normalize_rows(&rows, options))),
        Err(err) => warn!(error = %err, "Failed to load sensor feed"),
    }
    match source.load_forecast() {
        Ok(rows) => events.push(Event::ForecastLoaded(normalize_forecast_rows(&rows))),
        Err(err) => warn!(error = %err, "Failed to load forecast feed"),
    }
    events
}

pub fn spawn_feed_reload_thread<R>(
    mut source: R,
    options: NormalizeOptions,
    events: mpsc::Sender<Event>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()>
where
    R: RowSource + Send + 'static,
{
    std::thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();

            for event in load_feed_events(&mut source, options) {
                if events.blocking_send(event).is_err() {
                    warn!("Engine channel closed, stopping feed reload thread");
                    return;
                }
            }

            sleep_with_stop(interval, &stop, cycle_start);
        }
    })
}

fn sleep_with_stop(duration: Duration, stop: &AtomicBool, start: Instant) {
    let elapsed = start.elapsed();
    if elapsed >= duration {
        return;
    }
    let remaining = duration - elapsed;
    let step = Duration::from_millis(100).min(remaining);
    let mut slept = Duration::ZERO;

    while slept < remaining {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        std::thread::sleep(step);
        slept += step;
    }
}

/// Load the scene asset off the async runtime. Failures become
/// `SceneUnavailable`, which leaves mapping deferred.
pub async fn load_scene(path: PathBuf) -> Event {
    let display_path = path.display().to_string();
    match tokio::task::spawn_blocking(move || Scene::load(&path)).await {
        Ok(Ok(scene)) => {
            info!(path = %display_path, nodes = scene.len(), "Scene asset loaded");
            Event::SceneLoaded(Box::new(scene))
        }
        Ok(Err(err)) => Event::SceneUnavailable(format!("{display_path}: {err}")),
        Err(err) => Event::SceneUnavailable(format!("{display_path}: loader task failed: {err}")),
    }
}

/// Decode the decorative texture to make sure the renderer can use it.
pub async fn load_texture(path: PathBuf) -> Option<Event> {
    let handle = TextureRef(Arc::from(path.display().to_string()));
    match tokio::task::spawn_blocking(move || decode_texture(&path)).await {
        Ok(Ok((width, height))) => {
            info!(texture = %handle.0, width, height, "Decorative texture decoded");
            Some(Event::TextureLoaded(handle))
        }
        Ok(Err(err)) => {
            warn!(texture = %handle.0, error = %err, "Failed to load decorative texture");
            None
        }
        Err(err) => {
            warn!(texture = %handle.0, error = %err, "Texture loader task failed");
            None
        }
    }
}

fn decode_texture(path: &Path) -> Result<(u32, u32), image::ImageError> {
    let texture = image::open(path)?;
    Ok((texture.width(), texture.height()))
}
