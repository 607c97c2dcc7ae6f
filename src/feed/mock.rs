use crate::feed::{Cell, FeedError, RawForecastRow, RawRow, RowSource};

#[derive(Debug, Clone, Default)]
pub struct MockRowSource {
    pub rows: Vec<RawRow>,
    pub forecast: Vec<RawForecastRow>,
    pub records_ok: bool,
    pub forecast_ok: bool,
    pub loads: u32,
}

impl MockRowSource {
    pub fn with_rows(rows: Vec<RawRow>, forecast: Vec<RawForecastRow>) -> Self {
        Self {
            rows,
            forecast,
            records_ok: true,
            forecast_ok: true,
            loads: 0,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            records_ok: false,
            forecast_ok: false,
            ..Self::default()
        }
    }
}

impl RowSource for MockRowSource {
    fn load_records(&mut self) -> Result<Vec<RawRow>, FeedError> {
        self.loads += 1;
        if !self.records_ok {
            return Err(FeedError::Unavailable("mock records unavailable".to_string()));
        }
        Ok(self.rows.clone())
    }

    fn load_forecast(&mut self) -> Result<Vec<RawForecastRow>, FeedError> {
        if !self.forecast_ok {
            return Err(FeedError::Unavailable("mock forecast unavailable".to_string()));
        }
        Ok(self.forecast.clone())
    }
}

/// Row with a CO2 reading only; the other KPI columns are blank.
pub fn co2_row(room: &str, timestamp: &str, co2: f64) -> RawRow {
    RawRow {
        room_id: Some(Cell::Text(room.to_string())),
        timestamp: Some(timestamp.to_string()),
        co2: Some(Cell::Number(co2)),
        ..RawRow::default()
    }
}

pub fn co2_forecast_row(co2: f64) -> RawForecastRow {
    RawForecastRow {
        co2: Some(Cell::Number(co2)),
        ..RawForecastRow::default()
    }
}
