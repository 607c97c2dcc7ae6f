//! KPI aggregation over normalized sensor records.
//!
//! The scalar average honours the month filter; the per-room table is always
//! computed over the whole record set so room labels show live state.

use crate::feed::{ForecastRecord, Kpi, KpiValues, MonthFilter, RoomId, SensorRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

pub mod series;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Historical,
    Forecast,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            mode if mode.eq_ignore_ascii_case("historical") => Ok(Mode::Historical),
            mode if mode.eq_ignore_ascii_case("forecast") => Ok(Mode::Forecast),
            _ => Err(format!("unknown mode: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub kpi: Kpi,
    pub month: MonthFilter,
    pub mode: Mode,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            kpi: Kpi::Co2,
            month: MonthFilter::All,
            mode: Mode::Historical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggregate {
    pub scalar_average: f64,
    /// Room id -> average of the selected KPI, two decimals.
    pub per_room: BTreeMap<RoomId, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomAggregate {
    pub room_id: RoomId,
    pub count: u32,
    pub sums: KpiValues,
}

impl RoomAggregate {
    fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            count: 0,
            sums: KpiValues::default(),
        }
    }

    fn push(&mut self, values: &KpiValues) {
        self.count += 1;
        self.sums.accumulate(values);
    }

    /// Per-KPI averages rounded to two decimals.
    pub fn averages(&self) -> KpiValues {
        let count = f64::from(self.count.max(1));
        self.sums.map(|sum| round2(sum / count))
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Group every record by room. Buckets only exist once a record landed in them.
pub fn room_aggregates(records: &[SensorRecord]) -> Vec<RoomAggregate> {
    let mut rooms: BTreeMap<&str, RoomAggregate> = BTreeMap::new();
    for record in records {
        rooms
            .entry(record.room_id.as_str())
            .or_insert_with(|| RoomAggregate::new(record.room_id.clone()))
            .push(&record.values);
    }
    rooms.into_values().collect()
}

pub fn filter_records<'a>(
    records: &'a [SensorRecord],
    filter: &MonthFilter,
) -> Vec<&'a SensorRecord> {
    records
        .iter()
        .filter(|record| filter.matches(record.month))
        .collect()
}

pub fn aggregate(records: &[SensorRecord], filter: &MonthFilter, kpi: Kpi) -> Aggregate {
    let filtered = filter_records(records, filter);
    let scalar_average = mean(filtered.iter().map(|record| record.value(kpi)), filtered.len());

    let per_room = room_aggregates(records)
        .into_iter()
        .map(|room| {
            let average = room.averages().get(kpi);
            (room.room_id, average)
        })
        .collect();

    Aggregate {
        scalar_average,
        per_room,
    }
}

pub fn forecast_average(rows: &[ForecastRecord], kpi: Kpi) -> f64 {
    mean(rows.iter().map(|row| row.values.get(kpi)), rows.len())
}

/// Scalar value for the active mode plus the per-room table. Forecast rows
/// carry no room dimension, so rooms always come from the historical records.
pub fn compute_kpi(
    records: &[SensorRecord],
    forecast: &[ForecastRecord],
    selection: &Selection,
) -> Aggregate {
    let historical = aggregate(records, &selection.month, selection.kpi);
    match selection.mode {
        Mode::Historical => historical,
        Mode::Forecast => Aggregate {
            scalar_average: forecast_average(forecast, selection.kpi),
            per_room: historical.per_room,
        },
    }
}

fn mean(values: impl Iterator<Item = f64>, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let sum: f64 = values.map(|value| if value.is_finite() { value } else { 0.0 }).sum();
    let average = sum / count as f64;
    if average.is_finite() { average } else { 0.0 }
}
