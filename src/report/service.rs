use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, info_span};

use super::log::LogEntry;
use super::pdf::{load_letterhead_image, render_report, ReportDocument};
use super::{PatientMetadata, ReportError};
use crate::core_state::AppContext;
use crate::pipeline::preprocess::{decode_rgb, encode_jpeg};

const STORED_JPEG_QUALITY: u8 = 90;

/// Result of one successful report generation.
#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome {
    /// Base name shared by the PDF and image files.
    pub report_name: String,
    /// `<report_name>.pdf`, the download key.
    pub file_name: String,
    pub prompt: String,
    pub findings: String,
    pub pdf_path: PathBuf,
}

/// Upload bytes + patient details → findings, stored image, PDF and log row.
///
/// Blocking: runs model inference and file I/O on the calling thread.
pub fn generate_report(
    ctx: &AppContext,
    image_bytes: &[u8],
    metadata: &PatientMetadata,
) -> Result<ReportOutcome, ReportError> {
    let start = Instant::now();
    let image = decode_rgb(image_bytes)?;

    let generated = ctx.pipeline().run(&image)?;

    let jpeg = encode_jpeg(&image, STORED_JPEG_QUALITY)?;

    let paths = &ctx.config().paths;
    let logo = load_letterhead_image(&paths.logo);
    let signature = load_letterhead_image(&paths.signature);

    let pdf = render_report(&ReportDocument {
        letterhead: &ctx.config().letterhead,
        metadata,
        findings: &generated.findings,
        xray: &image,
        logo: logo.as_ref(),
        signature: signature.as_ref(),
    })?;

    // Nothing touches the disk before this point
    let now = Local::now();
    let report_name = ctx.store().allocate_name(now)?;
    let _span = info_span!("generate_report", report = %report_name).entered();

    let pdf_path = match persist(ctx, &report_name, &jpeg, &pdf, metadata, now) {
        Ok(path) => path,
        Err(e) => {
            ctx.store().discard(&report_name);
            return Err(e);
        }
    };

    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        findings_lines = generated.findings.lines().count(),
        "Report generated"
    );

    Ok(ReportOutcome {
        file_name: format!("{report_name}.pdf"),
        report_name,
        prompt: generated.prompt,
        findings: generated.findings,
        pdf_path,
    })
}

/// Write the image and PDF, then the log row. The caller discards the files on error.
fn persist(
    ctx: &AppContext,
    report_name: &str,
    jpeg: &[u8],
    pdf: &[u8],
    metadata: &PatientMetadata,
    now: DateTime<Local>,
) -> Result<PathBuf, ReportError> {
    ctx.store().write_image(report_name, jpeg)?;
    let pdf_path = ctx.store().write_pdf(report_name, pdf)?;
    ctx.log().append(&LogEntry::new(metadata, &pdf_path, now))?;
    Ok(pdf_path)
}
