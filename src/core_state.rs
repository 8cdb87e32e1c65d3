//! Application context.
//!
//! Built once at start-up and shared as `Arc<AppContext>` by every request.
//! Model handles inside are read-only after construction; sessions that need
//! exclusive access guard themselves.

use std::sync::Arc;

use thiserror::Error;

use crate::config::ReportConfig;
use crate::hardware::InferenceDevice;
use crate::pipeline::{
    EmbeddingToPrompt, FindingsGenerator, FindingsPipeline, ImageEmbedder, PipelineError,
};
use crate::report::{ReportError, ReportLog, ReportStore};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Model loading failed: {0}")]
    Models(#[from] PipelineError),

    #[error("Report storage unavailable: {0}")]
    Storage(#[from] ReportError),

    #[error("Built without the `onnx-models` feature; no inference backend available")]
    NoInferenceBackend,
}

pub struct AppContext {
    config: ReportConfig,
    device: InferenceDevice,
    pipeline: FindingsPipeline,
    store: ReportStore,
    log: ReportLog,
}

impl AppContext {
    /// Assemble from already-loaded models.
    pub fn new(
        config: ReportConfig,
        device: InferenceDevice,
        embedder: Arc<dyn ImageEmbedder>,
        generator: Arc<dyn FindingsGenerator>,
    ) -> Result<Self, CoreError> {
        let store = ReportStore::open(&config.paths.report_dir)?;
        let log = ReportLog::new(&config.paths.log_csv);
        let pipeline = FindingsPipeline::new(
            EmbeddingToPrompt::new(embedder, config.prompt.top_k),
            generator,
        );

        tracing::info!(
            %device,
            embedder = pipeline.reducer().embedder_name(),
            generator = pipeline.generator_name(),
            top_k = config.prompt.top_k,
            report_dir = %store.dir().display(),
            "Application context ready"
        );

        Ok(Self {
            config,
            device,
            pipeline,
            store,
            log,
        })
    }

    /// Load the ONNX vision encoder and seq2seq generator named by the config.
    #[cfg(feature = "onnx-models")]
    pub fn load(config: ReportConfig, device: InferenceDevice) -> Result<Self, CoreError> {
        use crate::pipeline::embedder::OnnxImageEmbedder;
        use crate::pipeline::generator::OnnxSeq2SeqGenerator;
        use crate::pipeline::preprocess::VisionInputConfig;

        let models = &config.models;
        let embedder = OnnxImageEmbedder::load(
            &models.vision_dir,
            device,
            models.intra_threads,
            VisionInputConfig::rad_dino(),
        )?;
        let generator = OnnxSeq2SeqGenerator::load(
            &models.generator_dir,
            device,
            models.intra_threads,
            config.generation.clone(),
        )?;

        Self::new(config, device, Arc::new(embedder), Arc::new(generator))
    }

    #[cfg(not(feature = "onnx-models"))]
    pub fn load(_config: ReportConfig, _device: InferenceDevice) -> Result<Self, CoreError> {
        Err(CoreError::NoInferenceBackend)
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn device(&self) -> InferenceDevice {
        self.device
    }

    pub fn pipeline(&self) -> &FindingsPipeline {
        &self.pipeline
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    pub fn log(&self) -> &ReportLog {
        &self.log
    }
}

#[cfg(test)]
impl AppContext {
    /// Mock-model context writing everything under `root`.
    pub(crate) fn for_tests(
        root: &std::path::Path,
        generator: impl FindingsGenerator + 'static,
    ) -> Self {
        let mut config = ReportConfig::default();
        config.paths.report_dir = root.join("reports");
        config.paths.log_csv = root.join("report_logs.csv");
        config.paths.logo = root.join("assets").join("logo.png");
        config.paths.signature = root.join("assets").join("signature.png");

        Self::new(
            config,
            InferenceDevice::Cpu,
            Arc::new(crate::pipeline::MockImageEmbedder::default()),
            Arc::new(generator),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ScriptedGenerator;

    #[test]
    fn new_creates_report_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = AppContext::for_tests(tmp.path(), ScriptedGenerator::new("x"));
        assert!(ctx.store().dir().is_dir());
        assert_eq!(ctx.device(), InferenceDevice::Cpu);
        assert_eq!(ctx.pipeline().reducer().top_k(), 32);
    }

    #[test]
    fn log_path_follows_config() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = AppContext::for_tests(tmp.path(), ScriptedGenerator::new("x"));
        assert_eq!(ctx.log().path(), tmp.path().join("report_logs.csv"));
    }

    #[cfg(not(feature = "onnx-models"))]
    #[test]
    fn load_without_backend_fails() {
        let result = AppContext::load(ReportConfig::default(), InferenceDevice::Cpu);
        assert!(matches!(result, Err(CoreError::NoInferenceBackend)));
    }

    #[cfg(feature = "onnx-models")]
    #[test]
    fn load_missing_models_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = ReportConfig::default();
        config.models.vision_dir = tmp.path().join("absent");
        config.paths.report_dir = tmp.path().join("reports");
        let result = AppContext::load(config, InferenceDevice::Cpu);
        assert!(matches!(
            result,
            Err(CoreError::Models(PipelineError::ModelNotFound(_)))
        ));
    }
}
