//! Append-only CSV log of generated reports.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::Serialize;

use super::{PatientMetadata, ReportError};

/// One CSV row. Field order is the column order.
#[derive(Debug, Serialize)]
pub struct LogEntry<'a> {
    #[serde(rename = "Patient Name")]
    pub patient_name: &'a str,
    #[serde(rename = "Referred By")]
    pub referred_by: &'a str,
    #[serde(rename = "Date Taken")]
    pub date_taken: &'a str,
    #[serde(rename = "Date of Report")]
    pub date_of_report: &'a str,
    #[serde(rename = "Complaint")]
    pub complaint: &'a str,
    #[serde(rename = "History")]
    pub history: &'a str,
    #[serde(rename = "PDF Path")]
    pub pdf_path: String,
    #[serde(rename = "Generated At")]
    pub generated_at: String,
}

impl<'a> LogEntry<'a> {
    pub fn new(metadata: &'a PatientMetadata, pdf_path: &Path, generated_at: DateTime<Local>) -> Self {
        Self {
            patient_name: &metadata.name,
            referred_by: &metadata.referred_by,
            date_taken: &metadata.date_taken,
            date_of_report: &metadata.date_of_report,
            complaint: &metadata.complaint,
            history: &metadata.history,
            pdf_path: pdf_path.display().to_string(),
            generated_at: generated_at.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        }
    }
}

/// CSV file writer. The header row is written only when the file is new or empty.
#[derive(Debug)]
pub struct ReportLog {
    path: PathBuf,
    // Serializes appends from concurrent requests
    write_lock: Mutex<()>,
}

impl ReportLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &LogEntry<'_>) -> Result<(), ReportError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| std::io::Error::other("Report log lock poisoned"))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let needs_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(entry)?;
        writer.flush()?;

        tracing::debug!(log = %self.path.display(), "Report logged");
        Ok(())
    }
}
