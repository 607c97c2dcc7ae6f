use crate::aggregation::series::DEFAULT_MOVING_AVERAGE_WINDOW;
use crate::binder::{AnchorOffsets, OverlayStyle, RoomBinding, default_bindings};
use crate::colormap::{DomainTable, HeatmapPolicy};
use crate::feed::NormalizeOptions;
use crate::scene::Footprint;
use crate::visibility::FloorKeywords;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 60;
/// Largest heatmap texture edge accepted from config, in pixels.
pub const MAX_TEXTURE_SIZE: u32 = 4096;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub data: Option<DataSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub domains: DomainsSection,
    #[serde(default)]
    pub heatmap: HeatmapSection,
    #[serde(default)]
    pub anchors: AnchorOffsets,
    #[serde(default)]
    pub floors: FloorKeywords,
    #[serde(default)]
    pub rooms: Option<RoomsSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataSection {
    /// Parsed sensor rows (JSON array)
    pub records_path: Option<PathBuf>,
    /// Parsed forecast rows (JSON array)
    pub forecast_path: Option<PathBuf>,
    /// Scene description of the building model
    pub scene_path: Option<PathBuf>,
    /// Decorative texture applied to structural meshes
    pub texture_path: Option<PathBuf>,
    /// SpaceUtil column holds 0..1 fractions instead of percentages
    #[serde(default)]
    pub space_util_fraction: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
    /// Feed reload interval in seconds (default: 60)
    pub reload_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DomainsSection {
    #[serde(default = "DomainTable::gauge_defaults")]
    pub gauge: DomainTable,
    #[serde(default = "DomainTable::heatmap_defaults")]
    pub heatmap: DomainTable,
}

impl Default for DomainsSection {
    fn default() -> Self {
        Self {
            gauge: DomainTable::gauge_defaults(),
            heatmap: DomainTable::heatmap_defaults(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HeatmapSection {
    pub cutoff: Option<f64>,
    pub opacity: Option<f32>,
    pub texture_size: Option<u32>,
    pub moving_average_window: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoomsSection {
    #[serde(default)]
    pub bindings: Vec<RoomBinding>,
    #[serde(default)]
    pub footprint: Option<Footprint>,
    /// Room id -> footprint for rooms that don't fit the default box. When
    /// absent the sample building's overrides apply; an empty table clears them.
    #[serde(default)]
    pub footprint_overrides: Option<HashMap<String, Footprint>>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        self.domains
            .gauge
            .validate()
            .map_err(|err| ConfigError::Invalid(format!("domains.gauge: {err}")))?;
        self.domains
            .heatmap
            .validate()
            .map_err(|err| ConfigError::Invalid(format!("domains.heatmap: {err}")))?;
        if let Some(cutoff) = self.heatmap.cutoff
            && !(0.0..=1.0).contains(&cutoff)
        {
            return Err(ConfigError::Invalid(format!(
                "heatmap.cutoff must be within 0..=1 (got {cutoff})"
            )));
        }
        if let Some(opacity) = self.heatmap.opacity
            && !(0.0..=1.0).contains(&opacity)
        {
            return Err(ConfigError::Invalid(format!(
                "heatmap.opacity must be within 0..=1 (got {opacity})"
            )));
        }
        if let Some(size) = self.heatmap.texture_size
            && !(1..=MAX_TEXTURE_SIZE).contains(&size)
        {
            return Err(ConfigError::Invalid(format!(
                "heatmap.texture_size must be within 1..={MAX_TEXTURE_SIZE} (got {size})"
            )));
        }
        Ok(())
    }

    /// Parsed `[logging].level`, falling back to INFO.
    pub fn log_level(&self) -> tracing::Level {
        self.logging.level.parse().unwrap_or(tracing::Level::INFO)
    }

    fn data_path(&self, pick: impl Fn(&DataSection) -> Option<&PathBuf>) -> Option<&Path> {
        let path = pick(self.data.as_ref()?)?;
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path.as_path())
        }
    }

    pub fn records_path(&self) -> Option<&Path> {
        self.data_path(|data| data.records_path.as_ref())
    }

    pub fn forecast_path(&self) -> Option<&Path> {
        self.data_path(|data| data.forecast_path.as_ref())
    }

    pub fn scene_path(&self) -> Option<&Path> {
        self.data_path(|data| data.scene_path.as_ref())
    }

    pub fn texture_path(&self) -> Option<&Path> {
        self.data_path(|data| data.texture_path.as_ref())
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            space_util_is_fraction: self
                .data
                .as_ref()
                .is_some_and(|data| data.space_util_fraction),
        }
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    /// Returns the feed reload interval as Duration (default: 60 seconds)
    pub fn reload_interval(&self) -> Duration {
        let secs = self
            .server
            .as_ref()
            .and_then(|s| s.reload_interval_secs)
            .unwrap_or(DEFAULT_RELOAD_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    /// Configured room bindings, or the sample building's when none are given.
    pub fn room_bindings(&self) -> Vec<RoomBinding> {
        match &self.rooms {
            Some(rooms) if !rooms.bindings.is_empty() => rooms.bindings.clone(),
            _ => default_bindings(),
        }
    }

    pub fn default_footprint(&self) -> Footprint {
        self.rooms
            .as_ref()
            .and_then(|rooms| rooms.footprint)
            .unwrap_or_default()
    }

    pub fn footprint_overrides(&self) -> HashMap<String, Footprint> {
        self.rooms
            .as_ref()
            .and_then(|rooms| rooms.footprint_overrides.clone())
            .unwrap_or_else(crate::binder::default_footprint_overrides)
    }

    pub fn overlay_style(&self) -> OverlayStyle {
        let defaults = OverlayStyle::default();
        let size = self.heatmap.texture_size.unwrap_or(defaults.texture_width);
        OverlayStyle {
            opacity: self.heatmap.opacity.unwrap_or(defaults.opacity),
            texture_width: size,
            texture_height: size,
            policy: HeatmapPolicy {
                cutoff: self.heatmap.cutoff.unwrap_or(defaults.policy.cutoff),
            },
        }
    }

    pub fn moving_average_window(&self) -> usize {
        self.heatmap
            .moving_average_window
            .unwrap_or(DEFAULT_MOVING_AVERAGE_WINDOW)
    }
}
