//! ONNX Runtime session construction shared by the embedder and generator.

use std::path::Path;

use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;

use super::PipelineError;
use crate::hardware::InferenceDevice;

/// Build an inference session for one model file on the selected device.
pub(crate) fn build_session(
    model_path: &Path,
    device: InferenceDevice,
    intra_threads: usize,
) -> Result<Session, PipelineError> {
    if !model_path.exists() {
        return Err(PipelineError::ModelNotFound(model_path.to_path_buf()));
    }

    let mut builder = Session::builder()
        .map_err(|e: ort::Error| PipelineError::ModelInit(e.to_string()))?
        .with_intra_threads(intra_threads.max(1))
        .map_err(|e: ort::Error| PipelineError::ModelInit(e.to_string()))?;

    if device == InferenceDevice::Cuda {
        builder = builder
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .map_err(|e| PipelineError::ModelInit(format!("CUDA provider: {e}")))?;
    }

    let session = builder
        .commit_from_file(model_path)
        .map_err(|e: ort::Error| PipelineError::ModelInit(format!("ONNX load failed: {e}")))?;

    tracing::info!(model = %model_path.display(), %device, "ONNX session loaded");
    Ok(session)
}
