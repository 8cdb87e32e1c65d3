pub mod preprocess;
pub mod embedder;
pub mod generator;
pub mod reducer;
pub mod findings;
pub mod orchestrator;
#[cfg(feature = "onnx-models")]
pub(crate) mod runtime;

pub use embedder::{ImageEmbedder, MockImageEmbedder};
pub use findings::clean_findings;
pub use generator::{FindingsGenerator, ScriptedGenerator};
pub use orchestrator::{FindingsPipeline, GeneratedFindings};
pub use reducer::{EmbeddingToPrompt, SemanticToken};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Image decoding failed: {0}")]
    ImageDecode(String),

    #[error("Image preprocessing failed: {0}")]
    ImageProcessing(String),

    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Model not loaded: {0}")]
    ModelNotLoaded(&'static str),

    #[error("Model initialization: {0}")]
    ModelInit(String),

    #[error("Tokenization error: {0}")]
    Tokenization(String),

    #[error("Embedding inference failed: {0}")]
    Embedding(String),

    #[error("Generation inference failed: {0}")]
    Generation(String),

    #[error("top_k must be between 1 and the embedding dimension ({dimension}), got {top_k}")]
    InvalidTopK { top_k: usize, dimension: usize },
}
