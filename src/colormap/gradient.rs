//! Procedural heatmap textures.
//!
//! Gradients follow 2D-canvas rules: a vertical axis from the top row to the
//! bottom row, the first stop's color before it, the last stop's color after
//! it, and linear blending between neighbouring stops.

use crate::colormap::{KpiDomain, normalize};
use image::{ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

pub const DEFAULT_HEATMAP_CUTOFF: f64 = 0.7;

/// Fill used below the cutoff.
pub const LOW_INTENSITY: Rgba<u8> = Rgba([5, 255, 10, 255]);
/// Fill used at or above the cutoff; alpha is 0.97.
pub const HIGH_INTENSITY: Rgba<u8> = Rgba([255, 0, 0, 247]);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatmapPolicy {
    pub cutoff: f64,
}

impl Default for HeatmapPolicy {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_HEATMAP_CUTOFF,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearGradient {
    stops: Vec<(f64, Rgba<u8>)>,
}

impl LinearGradient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_color_stop(&mut self, offset: f64, color: Rgba<u8>) -> &mut Self {
        let offset = offset.clamp(0.0, 1.0);
        // Equal offsets keep insertion order.
        let index = self.stops.partition_point(|(existing, _)| *existing <= offset);
        self.stops.insert(index, (offset, color));
        self
    }

    pub fn stops(&self) -> &[(f64, Rgba<u8>)] {
        &self.stops
    }

    /// Color at position `t` along the gradient axis. Transparent when empty.
    pub fn color_at(&self, t: f64) -> Rgba<u8> {
        let (Some(first), Some(last)) = (self.stops.first(), self.stops.last()) else {
            return Rgba([0, 0, 0, 0]);
        };
        if t <= first.0 {
            return first.1;
        }
        if t >= last.0 {
            return last.1;
        }
        let upper = self.stops.partition_point(|(offset, _)| *offset <= t);
        let (low_offset, low) = self.stops[upper - 1];
        let (high_offset, high) = self.stops[upper];
        let span = high_offset - low_offset;
        if span <= 0.0 {
            return high;
        }
        let local = (t - low_offset) / span;
        let mut channels = [0u8; 4];
        for (index, channel) in channels.iter_mut().enumerate() {
            let a = f64::from(low.0[index]);
            let b = f64::from(high.0[index]);
            *channel = (a + (b - a) * local).round() as u8;
        }
        Rgba(channels)
    }

    /// Rasterize onto a `width` x `height` image, axis running top to bottom.
    pub fn render(&self, width: u32, height: u32) -> RgbaImage {
        let rows: Vec<Rgba<u8>> = (0..height)
            .map(|y| self.color_at((f64::from(y) + 0.5) / f64::from(height.max(1))))
            .collect();
        RgbaImage::from_fn(width, height, |_, y| rows[y as usize])
    }
}

/// Two-branch gradient for one room value. Below the cutoff the texture is
/// a flat low-intensity fill; from the cutoff up a single high-intensity stop
/// is placed at the normalized value.
pub fn heatmap_gradient(value: f64, domain: KpiDomain, policy: HeatmapPolicy) -> LinearGradient {
    let t = normalize(value, domain);
    let mut gradient = LinearGradient::new();
    if t < policy.cutoff {
        gradient.add_color_stop(0.0, LOW_INTENSITY);
    } else {
        gradient.add_color_stop(t, HIGH_INTENSITY);
    }
    gradient
}

pub fn heatmap_texture(
    value: f64,
    domain: KpiDomain,
    width: u32,
    height: u32,
    policy: HeatmapPolicy,
) -> RgbaImage {
    heatmap_gradient(value, domain, policy).render(width, height)
}

pub fn encode_png(texture: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    texture.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}
