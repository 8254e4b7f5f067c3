//! Plaintext analysis report output

use crate::models::Summary;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default location of the analysis report
pub const DEFAULT_REPORT_PATH: &str = "/app/analysis.txt";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Overwrites a single report file with the latest summary
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the report contents with `summary`
    pub async fn write(&self, summary: &Summary) -> Result<(), ReportError> {
        tokio::fs::write(&self.path, summary.render())
            .await
            .map_err(|source| ReportError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

impl Default for ReportWriter {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_PATH)
    }
}
