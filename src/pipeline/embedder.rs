use image::RgbImage;

use super::PipelineError;

/// Vision embedding model abstraction.
///
/// Implementations own their preprocessing: callers hand over the decoded RGB
/// image and get back one pooled embedding vector.
pub trait ImageEmbedder: Send + Sync {
    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, PipelineError>;

    /// Short label for logs and the health endpoint.
    fn name(&self) -> &str;
}

/// Mean over the token axis of a `[1, tokens, hidden]` hidden-state tensor.
///
/// Every token (class token included) is weighted equally.
pub fn mean_pool_tokens(shape: &[i64], data: &[f32]) -> Result<Vec<f32>, PipelineError> {
    let (tokens, hidden) = match shape {
        [1, tokens, hidden] if *tokens > 0 && *hidden > 0 => (*tokens as usize, *hidden as usize),
        _ => {
            return Err(PipelineError::Embedding(format!(
                "Unexpected hidden state shape: {shape:?}, expected [1, tokens, hidden]"
            )))
        }
    };
    if data.len() != tokens * hidden {
        return Err(PipelineError::Embedding(format!(
            "Hidden state has {} values, shape {shape:?} needs {}",
            data.len(),
            tokens * hidden
        )));
    }

    let mut pooled = vec![0.0f32; hidden];
    for token in data.chunks_exact(hidden) {
        for (p, v) in pooled.iter_mut().zip(token) {
            *p += v;
        }
    }
    let count = tokens as f32;
    for p in &mut pooled {
        *p /= count;
    }
    Ok(pooled)
}

// ═══════════════════════════════════════════════════════════
// ONNX vision encoder (behind `onnx-models` feature)
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx-models")]
mod onnx {
    use super::{mean_pool_tokens, ImageEmbedder, PipelineError};
    use crate::hardware::InferenceDevice;
    use crate::pipeline::preprocess::{VisionInputConfig, VisionPreprocessor};
    use crate::pipeline::runtime::build_session;
    use image::RgbImage;
    use ort::session::Session;
    use std::path::Path;
    use std::sync::Mutex;

    /// Vision encoder export (e.g. RAD-DINO) run through ONNX Runtime.
    ///
    /// Requires `model.onnx` in the model directory, taking `pixel_values`
    /// `[1, 3, H, W]` and producing `last_hidden_state` `[1, tokens, hidden]`.
    ///
    /// `Session::run` needs `&mut self`, hence the Mutex behind `&self`.
    pub struct OnnxImageEmbedder {
        session: Mutex<Session>,
        preprocessor: VisionPreprocessor,
    }

    impl OnnxImageEmbedder {
        pub fn load(
            model_dir: &Path,
            device: InferenceDevice,
            intra_threads: usize,
            input: VisionInputConfig,
        ) -> Result<Self, PipelineError> {
            let session = build_session(&model_dir.join("model.onnx"), device, intra_threads)?;
            Ok(Self {
                session: Mutex::new(session),
                preprocessor: VisionPreprocessor::new(input),
            })
        }
    }

    impl ImageEmbedder for OnnxImageEmbedder {
        fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, PipelineError> {
            use ort::value::TensorRef;

            let pixels = self.preprocessor.prepare(image)?;
            let [n, c, h, w] = pixels.shape;
            let array = ndarray::Array4::from_shape_vec((n, c, h, w), pixels.data)
                .map_err(|e| PipelineError::Embedding(e.to_string()))?;
            let input = TensorRef::from_array_view(&array)
                .map_err(|e| PipelineError::Embedding(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| PipelineError::Embedding("Session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs!["pixel_values" => input])
                .map_err(|e| PipelineError::Embedding(format!("ONNX inference failed: {e}")))?;

            let hidden = outputs.get("last_hidden_state").ok_or_else(|| {
                PipelineError::Embedding("Model has no last_hidden_state output".to_string())
            })?;
            let (shape, data) = hidden
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::Embedding(format!("Output extraction: {e}")))?;

            mean_pool_tokens(shape, data)
        }

        fn name(&self) -> &str {
            "onnx-vision"
        }
    }
}

#[cfg(feature = "onnx-models")]
pub use onnx::OnnxImageEmbedder;

/// Mock embedder for testing. Deterministic vectors derived from pixel data.
pub struct MockImageEmbedder {
    dimension: usize,
}

impl MockImageEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockImageEmbedder {
    fn default() -> Self {
        Self::new(768)
    }
}

impl ImageEmbedder for MockImageEmbedder {
    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, PipelineError> {
        Ok(deterministic_vector(image, self.dimension))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Signed values in roughly [-1, 1] sampled from the image's pixels.
fn deterministic_vector(image: &RgbImage, dim: usize) -> Vec<f32> {
    let raw = image.as_raw();
    let len = raw.len().max(1);

    (0..dim)
        .map(|i| {
            let byte = raw.get((i * 31 + 7) % len).copied().unwrap_or(0) as f32;
            let centered = byte / 127.5 - 1.0;
            // Spread magnitudes so top-k selection has real work to do
            centered * (((i * 17) % 13) as f32 + 1.0) / 13.0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 5 % 256) as u8, (y * 3 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn mean_pool_averages_tokens() {
        // 2 tokens x 3 hidden
        let data = [1.0, 2.0, 3.0, 3.0, 4.0, 5.0];
        let pooled = mean_pool_tokens(&[1, 2, 3], &data).unwrap();
        assert_eq!(pooled, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn mean_pool_single_token_is_identity() {
        let pooled = mean_pool_tokens(&[1, 1, 4], &[0.5, -0.5, 1.0, -1.0]).unwrap();
        assert_eq!(pooled, vec![0.5, -0.5, 1.0, -1.0]);
    }

    #[test]
    fn mean_pool_rejects_bad_rank() {
        assert!(mean_pool_tokens(&[1, 4], &[0.0; 4]).is_err());
    }

    #[test]
    fn mean_pool_rejects_batch_above_one() {
        assert!(mean_pool_tokens(&[2, 1, 2], &[0.0; 4]).is_err());
    }

    #[test]
    fn mean_pool_rejects_length_mismatch() {
        let err = mean_pool_tokens(&[1, 2, 2], &[0.0; 3]).unwrap_err();
        assert!(err.to_string().contains("needs 4"));
    }

    #[test]
    fn mock_embed_returns_requested_dimension() {
        let embedder = MockImageEmbedder::new(64);
        let v = embedder.embed(&gradient(8, 8)).unwrap();
        assert_eq!(v.len(), 64);
    }

    #[test]
    fn mock_embed_is_deterministic() {
        let embedder = MockImageEmbedder::default();
        let img = gradient(32, 32);
        assert_eq!(embedder.embed(&img).unwrap(), embedder.embed(&img).unwrap());
    }

    #[test]
    fn mock_embed_different_images_differ() {
        let embedder = MockImageEmbedder::default();
        let a = embedder.embed(&gradient(32, 32)).unwrap();
        let b = embedder.embed(&RgbImage::from_pixel(32, 32, Rgb([9, 9, 9]))).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn mock_embed_has_both_signs() {
        let embedder = MockImageEmbedder::default();
        let v = embedder.embed(&gradient(64, 64)).unwrap();
        assert!(v.iter().any(|x| *x > 0.0));
        assert!(v.iter().any(|x| *x < 0.0));
    }
}
