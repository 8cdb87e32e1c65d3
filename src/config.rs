//! Application configuration.
//!
//! A single TOML document deserialized into [`ReportConfig`]. Every field has a
//! default, so a missing file (or a partial one) is valid.
//!
//! Lookup order:
//! 1. `CXR_REPORT_CONFIG` env var (explicit path, must exist)
//! 2. `./cxr-report.toml`
//! 3. `<config dir>/cxr-report/config.toml`
//! 4. Built-in defaults

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "cxr-report";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Env var naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "CXR_REPORT_CONFIG";

/// Config file name looked up in the working directory.
const LOCAL_CONFIG_FILE: &str = "cxr-report.toml";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "cxr_report=info,tower_http=warn"
}

/// User-level config path: `<config dir>/cxr-report/config.toml`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Config file named by CXR_REPORT_CONFIG not found: {0}")]
    Missing(PathBuf),

    #[error("Invalid server bind address '{0}'")]
    BindAddress(String),

    #[error("prompt.top_k must be at least 1")]
    ZeroTopK,
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub models: ModelsConfig,
    pub prompt: PromptConfig,
    pub generation: GenerationConfig,
    pub paths: PathsConfig,
    pub server: ServerConfig,
    pub letterhead: LetterheadConfig,
}

/// Preferred inference device. `Auto` probes for CUDA at start-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Cuda,
}

/// Model locations and runtime options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory holding the vision encoder export (`model.onnx`).
    pub vision_dir: PathBuf,
    /// Directory holding the seq2seq export (`encoder_model.onnx`,
    /// `decoder_model.onnx`, `tokenizer.json`).
    pub generator_dir: PathBuf,
    pub device: DevicePreference,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            vision_dir: PathBuf::from("models/rad-dino"),
            generator_dir: PathBuf::from("models/clinical_t5_final"),
            device: DevicePreference::Auto,
            intra_threads: 2,
        }
    }
}

/// Embedding-to-prompt reduction settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromptConfig {
    /// Number of embedding components kept (and tokens emitted).
    pub top_k: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self { top_k: 32 }
    }
}

/// Seq2seq decoding settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Prompt token ids are truncated to this length.
    pub max_input_tokens: usize,
    pub max_new_tokens: usize,
    pub decoder_start_token_id: u32,
    pub eos_token_id: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: 256,
            max_new_tokens: 128,
            decoder_start_token_id: 0,
            eos_token_id: 1,
        }
    }
}

/// Output and asset locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub report_dir: PathBuf,
    pub log_csv: PathBuf,
    pub logo: PathBuf,
    pub signature: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            report_dir: PathBuf::from("outputs/reports"),
            log_csv: PathBuf::from("outputs/report_logs.csv"),
            logo: PathBuf::from("assets/logo.png"),
            signature: PathBuf::from("assets/signature.png"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Request body limit for uploads, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::BindAddress(self.bind.clone()))
    }
}

/// Text printed in the PDF header, footer and signature block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LetterheadConfig {
    pub practice_name: String,
    pub address: String,
    /// Printed after a `Phone:` label.
    pub phone: String,
    /// Printed after an `Email:` label.
    pub email: String,
    pub signer_name: String,
    pub signer_credentials: String,
}

impl Default for LetterheadConfig {
    fn default() -> Self {
        Self {
            practice_name: "DIAGNOSTIC X-RAY CONSULTATION SERVICES".to_string(),
            address: "Radiology Department".to_string(),
            phone: "(000) 000-0000".to_string(),
            email: "reports@example.com".to_string(),
            signer_name: "Consulting Radiologist".to_string(),
            signer_credentials: "Draft report, pending review".to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════

impl ReportConfig {
    /// Parse a TOML document. Missing sections and fields take defaults.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Resolve the config file using the documented lookup order.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(explicit);
            if !path.exists() {
                return Err(ConfigError::Missing(path));
            }
            tracing::info!(path = %path.display(), "Loading config from {CONFIG_ENV_VAR}");
            return Self::from_file(&path);
        }

        let candidates = std::iter::once(PathBuf::from(LOCAL_CONFIG_FILE)).chain(user_config_path());
        for path in candidates {
            if path.exists() {
                tracing::info!(path = %path.display(), "Loading config");
                return Self::from_file(&path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.prompt.top_k == 0 {
            return Err(ConfigError::ZeroTopK);
        }
        self.server.bind_addr()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_standard_layout() {
        let config = ReportConfig::default();
        assert_eq!(config.prompt.top_k, 32);
        assert_eq!(config.generation.max_input_tokens, 256);
        assert_eq!(config.generation.max_new_tokens, 128);
        assert_eq!(config.paths.report_dir, PathBuf::from("outputs/reports"));
        assert_eq!(config.paths.log_csv, PathBuf::from("outputs/report_logs.csv"));
        assert_eq!(config.models.device, DevicePreference::Auto);
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let config = ReportConfig::from_toml_str("", Path::new("test.toml")).unwrap();
        assert_eq!(config, ReportConfig::default());
    }

    #[test]
    fn partial_document_overrides_only_named_fields() {
        let text = r#"
            [prompt]
            top_k = 16

            [models]
            device = "cpu"

            [server]
            bind = "0.0.0.0:9000"
        "#;
        let config = ReportConfig::from_toml_str(text, Path::new("test.toml")).unwrap();
        assert_eq!(config.prompt.top_k, 16);
        assert_eq!(config.models.device, DevicePreference::Cpu);
        assert_eq!(config.models.intra_threads, 2);
        assert_eq!(config.server.bind_addr().unwrap().port(), 9000);
        assert_eq!(config.generation, GenerationConfig::default());
    }

    #[test]
    fn zero_top_k_rejected() {
        let err = ReportConfig::from_toml_str("[prompt]\ntop_k = 0", Path::new("t.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroTopK));
    }

    #[test]
    fn bad_bind_address_rejected() {
        let err = ReportConfig::from_toml_str("[server]\nbind = \"nowhere\"", Path::new("t.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::BindAddress(_)));
    }

    #[test]
    fn malformed_toml_reports_path() {
        let err = ReportConfig::from_toml_str("[prompt", Path::new("broken.toml")).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn from_file_reads_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[generation]\nmax_new_tokens = 64\n").unwrap();
        let config = ReportConfig::from_file(&path).unwrap();
        assert_eq!(config.generation.max_new_tokens, 64);
    }

    #[test]
    fn from_file_missing_is_read_error() {
        let err = ReportConfig::from_file(Path::new("/nonexistent/cxr.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn device_preference_serializes_snake_case() {
        let json = serde_json::to_string(&DevicePreference::Cuda).unwrap();
        assert_eq!(json, "\"cuda\"");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
