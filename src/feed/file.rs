use crate::feed::{FeedError, RawForecastRow, RawRow, RowSource};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads row arrays that the tabular parser exported as JSON.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    records_path: PathBuf,
    forecast_path: Option<PathBuf>,
}

impl JsonFileSource {
    pub fn new(records_path: impl Into<PathBuf>, forecast_path: Option<PathBuf>) -> Self {
        Self {
            records_path: records_path.into(),
            forecast_path,
        }
    }
}

impl RowSource for JsonFileSource {
    fn load_records(&mut self) -> Result<Vec<RawRow>, FeedError> {
        read_rows(&self.records_path)
    }

    fn load_forecast(&mut self) -> Result<Vec<RawForecastRow>, FeedError> {
        match &self.forecast_path {
            Some(path) => read_rows(path),
            None => {
                debug!("No forecast feed configured");
                Ok(Vec::new())
            }
        }
    }
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, FeedError> {
    let contents = std::fs::read_to_string(path)?;
    let rows: Vec<T> = serde_json::from_str(&contents)?;
    debug!(path = %path.display(), rows = rows.len(), "Feed file read");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn reads_records_and_skips_missing_forecast() -> Result<(), Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = std::env::temp_dir().join(format!("roomlens-feed-{unique}.json"));
        fs::write(
            &path,
            r#"[{"RoomID": "Room 1", "Timestamp": "2024-01-01 00:00:00", "CO2": "500"}]"#,
        )?;

        let mut source = JsonFileSource::new(&path, None);
        let records = source.load_records();
        let forecast = source.load_forecast()?;
        let _ = fs::remove_file(&path);

        assert_eq!(records?.len(), 1);
        assert!(forecast.is_empty());
        Ok(())
    }

    #[test]
    fn missing_file_returns_read_error() {
        let mut source = JsonFileSource::new("/nonexistent/roomlens/kpis.json", None);

        assert!(matches!(source.load_records(), Err(FeedError::Read(_))));
    }

    #[test]
    fn invalid_json_returns_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = std::env::temp_dir().join(format!("roomlens-feed-bad-{unique}.json"));
        fs::write(&path, "[{")?;

        let mut source = JsonFileSource::new(&path, Some(path.clone()));
        let result = source.load_forecast();
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(FeedError::Parse(_))));
        Ok(())
    }
}
