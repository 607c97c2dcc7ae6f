use crate::feed::Kpi;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod gradient;

pub use gradient::{HeatmapPolicy, LinearGradient, heatmap_texture};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpiDomain {
    pub min: f64,
    pub max: f64,
}

impl KpiDomain {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Normalization bounds for every KPI. The gauge and the building heatmap
/// each get their own table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainTable {
    pub co2: KpiDomain,
    pub humidity: KpiDomain,
    pub temperature: KpiDomain,
    pub occupancy: KpiDomain,
    pub space_util: KpiDomain,
}

impl DomainTable {
    pub fn gauge_defaults() -> Self {
        Self {
            co2: KpiDomain::new(0.0, 1000.0),
            humidity: KpiDomain::new(30.0, 60.0),
            temperature: KpiDomain::new(17.0, 23.0),
            occupancy: KpiDomain::new(0.0, 50.0),
            space_util: KpiDomain::new(0.0, 30.0),
        }
    }

    pub fn heatmap_defaults() -> Self {
        Self {
            co2: KpiDomain::new(350.0, 1000.0),
            humidity: KpiDomain::new(20.0, 70.0),
            temperature: KpiDomain::new(0.0, 22.0),
            occupancy: KpiDomain::new(0.0, 20.0),
            space_util: KpiDomain::new(0.0, 46.0),
        }
    }

    pub fn get(&self, kpi: Kpi) -> KpiDomain {
        match kpi {
            Kpi::Co2 => self.co2,
            Kpi::Humidity => self.humidity,
            Kpi::Temperature => self.temperature,
            Kpi::Occupancy => self.occupancy,
            Kpi::SpaceUtil => self.space_util,
        }
    }

    /// Every domain must span a positive range.
    pub fn validate(&self) -> Result<(), String> {
        for kpi in Kpi::ALL {
            let domain = self.get(kpi);
            if !(domain.min.is_finite() && domain.max.is_finite() && domain.max > domain.min) {
                return Err(format!(
                    "domain for {kpi} must satisfy min < max (got {} .. {})",
                    domain.min, domain.max
                ));
            }
        }
        Ok(())
    }
}

/// Map `value` into `[0, 1]` within `domain`, clamped at both ends.
pub fn normalize(value: f64, domain: KpiDomain) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    let span = domain.max - domain.min;
    if span <= 0.0 {
        return if value >= domain.max { 1.0 } else { 0.0 };
    }
    ((value - domain.min) / span).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const GREEN: Color = Color::from_rgb8(0, 128, 0);
    pub const RED: Color = Color::from_rgb8(255, 0, 0);
    pub const LIGHT_GRAY: Color = Color::from_rgb8(211, 211, 211);
    pub const WHITE: Color = Color::from_rgb8(255, 255, 255);

    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        [channel(self.r), channel(self.g), channel(self.b)]
    }

    pub fn lerp(self, other: Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        Color {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
        }
    }

    pub fn to_hex(self) -> String {
        let [r, g, b] = self.to_rgb8();
        format!("#{r:02x}{g:02x}{b:02x}")
    }

    pub fn parse_hex(value: &str) -> Option<Color> {
        let hex = value.trim().strip_prefix('#')?;
        if hex.len() != 6 {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
        Some(Color::from_rgb8(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::parse_hex(&value).ok_or_else(|| format!("invalid color: {value}"))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Two-point color ramp, low intensity at `t = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorRamp {
    pub low: Color,
    pub high: Color,
}

impl Default for ColorRamp {
    fn default() -> Self {
        Self {
            low: Color::GREEN,
            high: Color::RED,
        }
    }
}

impl ColorRamp {
    pub fn color_for(&self, t: f64) -> Color {
        self.low.lerp(self.high, t as f32)
    }
}

pub fn color_for(t: f64) -> Color {
    ColorRamp::default().color_for(t)
}
