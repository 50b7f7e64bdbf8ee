use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use crate::import::{ImportError, ImportFormat};
use crate::models::{Session, Sport};

/// CSV importer for session summaries, one session per row
pub struct CsvImporter {
    column_mapping: HashMap<String, String>,
}

/// Columns resolved to their position in the header row
struct Columns(HashMap<String, usize>);

impl Columns {
    fn get<'r>(&self, record: &'r StringRecord, column: &str) -> Option<&'r str> {
        self.0
            .get(column)
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn require(&self, column: &str) -> Result<(), ImportError> {
        if self.0.contains_key(column) {
            Ok(())
        } else {
            Err(ImportError::MissingColumn(column.to_string()))
        }
    }
}

impl CsvImporter {
    pub fn new() -> Self {
        let mut column_mapping = HashMap::new();

        // Common column name variations
        Self::add_mapping(&mut column_mapping, "id", &["id", "session_id", "activity_id"]);
        Self::add_mapping(&mut column_mapping, "date", &["date", "start_date", "day"]);
        Self::add_mapping(&mut column_mapping, "sport", &["sport", "type", "activity_type"]);
        Self::add_mapping(
            &mut column_mapping,
            "duration_seconds",
            &["duration_seconds", "duration", "duration_s", "elapsed_time", "moving_time"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "distance",
            &["distance", "distance_m", "dist"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "avg_heart_rate",
            &["avg_heart_rate", "avg_hr", "heart_rate", "hr"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "avg_power",
            &["avg_power", "power", "average_watts", "watts"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "normalized_power",
            &["normalized_power", "np", "weighted_average_watts"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "avg_speed",
            &["avg_speed", "avg_speed_mps", "average_speed", "speed"],
        );

        Self { column_mapping }
    }

    fn add_mapping(mapping: &mut HashMap<String, String>, standard: &str, variations: &[&str]) {
        for variation in variations {
            mapping.insert(variation.to_lowercase(), standard.to_string());
        }
    }

    fn normalize_column_name(&self, name: &str) -> String {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");

        self.column_mapping
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    fn parse_date(value: &str) -> Option<NaiveDate> {
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Some(date);
        }

        let formats = [
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M:%SZ",
            "%Y-%m-%dT%H:%M:%S%.fZ",
        ];
        formats
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .map(|dt| dt.date())
    }

    /// Whole seconds; fractional values are rounded, negatives rejected
    fn parse_duration(value: &str) -> Result<u32, String> {
        let seconds = Decimal::from_str(value)
            .map_err(|_| format!("duration '{}' is not a number", value))?;
        if seconds.is_sign_negative() && !seconds.is_zero() {
            return Err(format!("duration cannot be negative: {}", value));
        }
        seconds
            .round()
            .to_u32()
            .ok_or_else(|| format!("duration out of range: {}", value))
    }

    fn parse_optional<T: FromStr>(
        columns: &Columns,
        record: &StringRecord,
        column: &str,
    ) -> Result<Option<T>, String> {
        columns
            .get(record, column)
            .map(|value| {
                value
                    .parse::<T>()
                    .map_err(|_| format!("invalid {} '{}'", column, value))
            })
            .transpose()
    }

    fn parse_row(
        columns: &Columns,
        record: &StringRecord,
        athlete_id: &str,
    ) -> Result<Session, String> {
        let date_value = columns.get(record, "date").ok_or("date is empty")?;
        let date = Self::parse_date(date_value)
            .ok_or_else(|| format!("unable to parse date '{}'", date_value))?;

        let sport = columns
            .get(record, "sport")
            .ok_or("sport is empty")?
            .parse::<Sport>()?;

        let duration = Self::parse_duration(
            columns
                .get(record, "duration_seconds")
                .ok_or("duration is empty")?,
        )?;

        let id = columns
            .get(record, "id")
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut session = Session::new(id, athlete_id, date, sport, duration);
        session.distance = Self::parse_optional(columns, record, "distance")?;
        session.avg_heart_rate = Self::parse_optional(columns, record, "avg_heart_rate")?;
        session.avg_power = Self::parse_optional(columns, record, "avg_power")?;
        session.normalized_power = Self::parse_optional(columns, record, "normalized_power")?;
        session.avg_speed = Self::parse_optional(columns, record, "avg_speed")?;

        if session.distance.is_some_and(|d| d.is_sign_negative() && !d.is_zero()) {
            return Err("distance cannot be negative".to_string());
        }
        Ok(session)
    }
}

impl Default for CsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportFormat for CsvImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase() == "csv")
            .unwrap_or(false)
    }

    fn import_file(&self, file_path: &Path, athlete_id: &str) -> Result<Vec<Session>, ImportError> {
        let read_error = |source| ImportError::Read {
            path: file_path.to_path_buf(),
            source,
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(file_path)
            .map_err(read_error)?;

        let headers = reader.headers().map_err(read_error)?.clone();
        let columns = Columns(
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| (self.normalize_column_name(header), i))
                .collect(),
        );
        for required in ["date", "sport", "duration_seconds"] {
            columns.require(required)?;
        }

        let mut sessions = Vec::new();
        for result in reader.records() {
            let record = result.map_err(read_error)?;
            let line = record.position().map_or(0, |p| p.line());

            let session = Self::parse_row(&columns, &record, athlete_id)
                .map_err(|reason| ImportError::InvalidRow { line, reason })?;
            sessions.push(session);
        }

        debug!(path = %file_path.display(), rows = sessions.len(), "Parsed CSV sessions");
        Ok(sessions)
    }

    fn get_format_name(&self) -> &'static str {
        "CSV"
    }
}
