use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use serde::Serialize;
use tracing::{info, info_span};

use super::{clean_findings, EmbeddingToPrompt, FindingsGenerator, PipelineError};

/// Output of one image → findings run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedFindings {
    /// Space-joined semantic tokens handed to the generator.
    pub prompt: String,
    /// Generator output before post-processing.
    pub raw_text: String,
    /// Bulleted, deduplicated lines ready for the report body.
    pub findings: String,
}

/// Image → prompt → generated text → cleaned findings.
///
/// Stateless between calls. Holds shared model handles only.
pub struct FindingsPipeline {
    reducer: EmbeddingToPrompt,
    generator: Arc<dyn FindingsGenerator>,
}

impl FindingsPipeline {
    pub fn new(reducer: EmbeddingToPrompt, generator: Arc<dyn FindingsGenerator>) -> Self {
        Self { reducer, generator }
    }

    pub fn reducer(&self) -> &EmbeddingToPrompt {
        &self.reducer
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Run the full chain. Any stage failure aborts the run.
    pub fn run(&self, image: &RgbImage) -> Result<GeneratedFindings, PipelineError> {
        let _span = info_span!(
            "findings_pipeline",
            width = image.width(),
            height = image.height()
        )
        .entered();
        let start = Instant::now();

        let prompt = self.reducer.prompt_for_image(image)?;
        let embed_ms = start.elapsed().as_millis() as u64;

        let raw_text = self.generator.generate(&prompt)?;
        let findings = clean_findings(&raw_text);

        info!(
            embed_ms,
            elapsed_ms = start.elapsed().as_millis() as u64,
            findings_lines = findings.lines().count(),
            "Findings generated"
        );

        Ok(GeneratedFindings {
            prompt,
            raw_text,
            findings,
        })
    }
}
