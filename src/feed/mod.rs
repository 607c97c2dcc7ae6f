use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime};

pub mod file;
pub mod mock;

pub type RoomId = String;

/// Sentinel used by the month selector for "no month filter".
pub const SELECT_ALL: &str = "Select All";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kpi {
    #[serde(rename = "CO2")]
    Co2,
    Humidity,
    Temperature,
    Occupancy,
    SpaceUtil,
}

impl Kpi {
    pub const ALL: [Kpi; 5] = [
        Kpi::Co2,
        Kpi::Humidity,
        Kpi::Temperature,
        Kpi::Occupancy,
        Kpi::SpaceUtil,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Kpi::Co2 => "CO2",
            Kpi::Humidity => "Humidity",
            Kpi::Temperature => "Temperature",
            Kpi::Occupancy => "Occupancy",
            Kpi::SpaceUtil => "SpaceUtil",
        }
    }
}

impl fmt::Display for Kpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kpi {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kpi::ALL
            .into_iter()
            .find(|kpi| kpi.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FeedError::UnknownKpi(s.to_string()))
    }
}

/// One value per KPI. Used both for single samples and for running sums.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KpiValues {
    pub co2: f64,
    pub humidity: f64,
    pub temperature: f64,
    pub occupancy: f64,
    pub space_util: f64,
}

impl KpiValues {
    pub fn get(&self, kpi: Kpi) -> f64 {
        match kpi {
            Kpi::Co2 => self.co2,
            Kpi::Humidity => self.humidity,
            Kpi::Temperature => self.temperature,
            Kpi::Occupancy => self.occupancy,
            Kpi::SpaceUtil => self.space_util,
        }
    }

    pub fn accumulate(&mut self, other: &KpiValues) {
        self.co2 += other.co2;
        self.humidity += other.humidity;
        self.temperature += other.temperature;
        self.occupancy += other.occupancy;
        self.space_util += other.space_util;
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> KpiValues {
        KpiValues {
            co2: f(self.co2),
            humidity: f(self.humidity),
            temperature: f(self.temperature),
            occupancy: f(self.occupancy),
            space_util: f(self.space_util),
        }
    }
}

/// A cell as it comes out of the tabular parser: text, a number, or nothing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    /// Numeric value of the cell; blanks and garbage read as zero.
    pub fn numeric(&self) -> f64 {
        let value = match self {
            Cell::Number(value) => *value,
            Cell::Text(text) => text.trim().parse::<f64>().unwrap_or(0.0),
        };
        if value.is_finite() { value } else { 0.0 }
    }

    pub fn text(&self) -> String {
        match self {
            Cell::Number(value) if value.fract() == 0.0 => format!("{value:.0}"),
            Cell::Number(value) => value.to_string(),
            Cell::Text(text) => text.trim().to_string(),
        }
    }
}

fn numeric(cell: &Option<Cell>) -> f64 {
    cell.as_ref().map(Cell::numeric).unwrap_or(0.0)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRow {
    #[serde(rename = "RoomID", alias = "room", alias = "room_id", default)]
    pub room_id: Option<Cell>,
    #[serde(rename = "Timestamp", alias = "start_time", default)]
    pub timestamp: Option<String>,
    #[serde(rename = "CO2", default)]
    pub co2: Option<Cell>,
    #[serde(rename = "Humidity", default)]
    pub humidity: Option<Cell>,
    #[serde(rename = "Temperature", default)]
    pub temperature: Option<Cell>,
    #[serde(rename = "Occupancy", default)]
    pub occupancy: Option<Cell>,
    #[serde(rename = "SpaceUtil", default)]
    pub space_util: Option<Cell>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawForecastRow {
    #[serde(rename = "CO2", default)]
    pub co2: Option<Cell>,
    #[serde(rename = "Humidity", default)]
    pub humidity: Option<Cell>,
    #[serde(rename = "Temperature", default)]
    pub temperature: Option<Cell>,
    #[serde(rename = "Occupancy", default)]
    pub occupancy: Option<Cell>,
    #[serde(rename = "SpaceUtil", default)]
    pub space_util: Option<Cell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub room_id: RoomId,
    pub values: KpiValues,
    pub month: Option<Month>,
    pub timestamp: String,
}

impl SensorRecord {
    pub fn value(&self, kpi: Kpi) -> f64 {
        self.values.get(kpi)
    }

    pub fn month_label(&self) -> Option<&'static str> {
        self.month.map(month_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRecord {
    pub values: KpiValues,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Feed variant where SpaceUtil is a 0..1 fraction rather than a percentage.
    pub space_util_is_fraction: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MonthFilter {
    #[default]
    All,
    Only(Month),
}

impl MonthFilter {
    pub fn matches(&self, month: Option<Month>) -> bool {
        match self {
            MonthFilter::All => true,
            MonthFilter::Only(wanted) => month == Some(*wanted),
        }
    }
}

impl FromStr for MonthFilter {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(SELECT_ALL) {
            return Ok(MonthFilter::All);
        }
        all_months()
            .find(|month| month_name(*month).eq_ignore_ascii_case(trimmed))
            .map(MonthFilter::Only)
            .ok_or_else(|| FeedError::UnknownMonth(s.to_string()))
    }
}

impl TryFrom<String> for MonthFilter {
    type Error = FeedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthFilter> for String {
    fn from(filter: MonthFilter) -> Self {
        match filter {
            MonthFilter::All => SELECT_ALL.to_string(),
            MonthFilter::Only(month) => month_name(month).to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read feed: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse feed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("feed unavailable: {0}")]
    Unavailable(String),
    #[error("unknown KPI: {0}")]
    UnknownKpi(String),
    #[error("unknown month: {0}")]
    UnknownMonth(String),
}

/// Collaborator that hands over already-parsed tabular rows.
pub trait RowSource {
    fn load_records(&mut self) -> Result<Vec<RawRow>, FeedError>;
    fn load_forecast(&mut self) -> Result<Vec<RawForecastRow>, FeedError>;
}

pub fn normalize_row(raw: &RawRow, options: NormalizeOptions) -> SensorRecord {
    let space_util = numeric(&raw.space_util);
    let timestamp = raw.timestamp.clone().unwrap_or_default();
    SensorRecord {
        room_id: raw.room_id.as_ref().map(Cell::text).unwrap_or_default(),
        values: KpiValues {
            co2: numeric(&raw.co2),
            humidity: numeric(&raw.humidity),
            temperature: numeric(&raw.temperature),
            occupancy: numeric(&raw.occupancy),
            space_util: if options.space_util_is_fraction {
                space_util * 100.0
            } else {
                space_util
            },
        },
        month: parse_month(&timestamp),
        timestamp,
    }
}

pub fn normalize_rows(rows: &[RawRow], options: NormalizeOptions) -> Vec<SensorRecord> {
    rows.iter().map(|row| normalize_row(row, options)).collect()
}

pub fn normalize_forecast_rows(rows: &[RawForecastRow]) -> Vec<ForecastRecord> {
    rows.iter()
        .map(|row| ForecastRecord {
            values: KpiValues {
                co2: numeric(&row.co2),
                humidity: numeric(&row.humidity),
                temperature: numeric(&row.temperature),
                occupancy: numeric(&row.occupancy),
                space_util: numeric(&row.space_util),
            },
        })
        .collect()
}

/// Calendar month of a feed timestamp, or `None` when it can't be read.
pub fn parse_month(timestamp: &str) -> Option<Month> {
    parse_date(timestamp).map(|date| date.month())
}

fn parse_date(timestamp: &str) -> Option<Date> {
    let trimmed = timestamp.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(datetime) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Some(datetime.date());
    }

    let datetime_formats = [
        format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
        ),
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
        ),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    ];
    for format in datetime_formats {
        if let Ok(datetime) = PrimitiveDateTime::parse(trimmed, format) {
            return Some(datetime.date());
        }
    }

    let date_part = trimmed.split([' ', 'T']).next().unwrap_or(trimmed);
    Date::parse(date_part, format_description!("[year]-[month]-[day]"))
        .or_else(|_| {
            Date::parse(
                date_part,
                format_description!("[month padding:none]/[day padding:none]/[year]"),
            )
        })
        .ok()
}

pub fn month_name(month: Month) -> &'static str {
    match month {
        Month::January => "January",
        Month::February => "February",
        Month::March => "March",
        Month::April => "April",
        Month::May => "May",
        Month::June => "June",
        Month::July => "July",
        Month::August => "August",
        Month::September => "September",
        Month::October => "October",
        Month::November => "November",
        Month::December => "December",
    }
}

fn all_months() -> impl Iterator<Item = Month> {
    std::iter::successors(Some(Month::January), |month| {
        (*month != Month::December).then(|| month.next())
    })
}

/// Entries of the month selector, sentinel first.
pub fn month_options() -> Vec<&'static str> {
    std::iter::once(SELECT_ALL)
        .chain(all_months().map(month_name))
        .collect()
}
