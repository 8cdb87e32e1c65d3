pub mod log;
pub mod pdf;
pub mod service;
pub mod store;

pub use log::ReportLog;
pub use pdf::{render_report, ReportDocument};
pub use service::{generate_report, ReportOutcome};
pub use store::ReportStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::PipelineError;

/// Patient details entered with the upload. All free text; the dates are
/// printed exactly as submitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientMetadata {
    pub name: String,
    pub referred_by: String,
    pub date_taken: String,
    pub date_of_report: String,
    pub complaint: String,
    pub history: String,
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV log error: {0}")]
    Csv(#[from] csv::Error),

    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    #[error("Invalid report file name: {0}")]
    InvalidFileName(String),

    #[error("Report not found: {0}")]
    NotFound(String),
}
