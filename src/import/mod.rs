use crate::models::Session;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub mod csv;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("No importer found for file: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ::csv::Error,
    },

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Line {line}: {reason}")]
    InvalidRow { line: u64, reason: String },
}

/// A file format that yields session records
pub trait ImportFormat {
    /// Check if this importer can handle the given file
    fn can_import(&self, file_path: &Path) -> bool;

    /// Read every session in the file, attributed to `athlete_id`
    fn import_file(&self, file_path: &Path, athlete_id: &str) -> Result<Vec<Session>, ImportError>;

    fn get_format_name(&self) -> &'static str;
}

/// Picks an importer by file type
pub struct SessionImporter {
    importers: Vec<Box<dyn ImportFormat>>,
}

impl SessionImporter {
    pub fn new() -> Self {
        let importers: Vec<Box<dyn ImportFormat>> = vec![Box::new(csv::CsvImporter::new())];
        Self { importers }
    }

    /// Import a single file, auto-detecting the format
    pub fn import_file(&self, file_path: &Path, athlete_id: &str) -> Result<Vec<Session>, ImportError> {
        let importer = self
            .importers
            .iter()
            .find(|importer| importer.can_import(file_path))
            .ok_or_else(|| ImportError::UnsupportedFormat(file_path.to_path_buf()))?;

        let sessions = importer.import_file(file_path, athlete_id)?;
        info!(
            path = %file_path.display(),
            format = importer.get_format_name(),
            athlete = athlete_id,
            sessions = sessions.len(),
            "Imported sessions"
        );
        Ok(sessions)
    }
}

impl Default for SessionImporter {
    fn default() -> Self {
        Self::new()
    }
}
