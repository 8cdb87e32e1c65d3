//! Report directory: file naming, writes and download resolution.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use uuid::Uuid;

use super::ReportError;

const MAX_SUFFIX_ATTEMPTS: usize = 8;

/// Flat directory holding `<name>.pdf` and `<name>_img.jpg` pairs.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    /// Open (creating if needed) the report directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ReportError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve `report_<YYYYmmdd_HHMMSS>`, with an 8-hex suffix when that
    /// second is taken.
    ///
    /// The name is claimed by creating an empty `<name>.pdf` with
    /// `create_new`, so concurrent callers never receive the same name.
    pub fn allocate_name(&self, now: DateTime<Local>) -> Result<String, ReportError> {
        let base = format!("report_{}", now.format("%Y%m%d_%H%M%S"));
        if self.try_reserve(&base)? {
            return Ok(base);
        }
        for _ in 0..MAX_SUFFIX_ATTEMPTS {
            let suffix = Uuid::new_v4().simple().to_string();
            let name = format!("{base}_{}", &suffix[..8]);
            if self.try_reserve(&name)? {
                return Ok(name);
            }
        }
        Err(ReportError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("No free report name for {base}"),
        )))
    }

    fn try_reserve(&self, name: &str) -> Result<bool, ReportError> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.pdf_path(name))
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove both files of a report that could not be completed.
    pub fn discard(&self, name: &str) {
        for path in [self.pdf_path(name), self.image_path(name)] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to discard report file"),
            }
        }
    }

    pub fn pdf_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.pdf"))
    }

    pub fn image_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}_img.jpg"))
    }

    pub fn write_image(&self, name: &str, jpeg: &[u8]) -> Result<PathBuf, ReportError> {
        let path = self.image_path(name);
        std::fs::write(&path, jpeg)?;
        Ok(path)
    }

    pub fn write_pdf(&self, name: &str, pdf: &[u8]) -> Result<PathBuf, ReportError> {
        let path = self.pdf_path(name);
        std::fs::write(&path, pdf)?;
        tracing::info!(report = %name, bytes = pdf.len(), "Report PDF written");
        Ok(path)
    }

    /// Map a client-supplied file name to a PDF inside the store.
    pub fn resolve_download(&self, file_name: &str) -> Result<PathBuf, ReportError> {
        if !is_safe_pdf_name(file_name) {
            return Err(ReportError::InvalidFileName(file_name.to_string()));
        }
        let path = self.dir.join(file_name);
        if !path.is_file() {
            return Err(ReportError::NotFound(file_name.to_string()));
        }
        Ok(path)
    }
}

/// A bare `*.pdf` file name: ASCII alphanumerics, `_`, `-` and a single `.pdf`
/// extension. Rules out separators, parent references and hidden files.
pub fn is_safe_pdf_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(".pdf") else {
        return false;
    };
    !stem.is_empty()
        && name.len() <= 128
        && stem
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
