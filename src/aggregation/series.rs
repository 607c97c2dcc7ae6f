//! Chart-facing derivations: room shares, smoothed time series, gauge reading.

use crate::colormap::{DomainTable, normalize};
use crate::feed::{Kpi, RoomId, SensorRecord};
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_MOVING_AVERAGE_WINDOW: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomShare {
    pub name: RoomId,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub time: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeReading {
    /// Position on the gauge, 0..=1.
    pub percent: f64,
    pub text: String,
}

/// Per-room sums of the selected KPI over every record.
pub fn room_totals(records: &[SensorRecord], kpi: Kpi) -> Vec<RoomShare> {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for record in records {
        *totals.entry(record.room_id.as_str()).or_insert(0.0) += record.value(kpi);
    }
    totals
        .into_iter()
        .map(|(name, value)| RoomShare {
            name: name.to_string(),
            value,
        })
        .collect()
}

/// Trailing moving average of the selected KPI, one point per record.
pub fn time_series(records: &[&SensorRecord], kpi: Kpi, window: usize) -> Vec<SeriesPoint> {
    let window = window.max(1);
    let values: Vec<f64> = records.iter().map(|record| record.value(kpi)).collect();
    let mut running = 0.0;

    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            running += values[index];
            if index >= window {
                running -= values[index - window];
            }
            let len = (index + 1).min(window);
            SeriesPoint {
                time: record.month_label().unwrap_or_default().to_string(),
                value: running / len as f64,
            }
        })
        .collect()
}

pub fn gauge_reading(value: f64, kpi: Kpi, domains: &DomainTable) -> GaugeReading {
    GaugeReading {
        percent: normalize(value, domains.get(kpi)),
        text: format!("{value:.1} {kpi}"),
    }
}
