//! Embedding → semantic prompt reduction.
//!
//! A pooled image embedding is reduced to a short sequence of intensity words
//! the text model was fine-tuned on:
//!
//! 1. keep the `top_k` components with the largest magnitude,
//! 2. min-max normalize those values to [0, 1],
//! 3. bucket each into one of five [`SemanticToken`]s,
//! 4. join with single spaces.
//!
//! The token order is the ascending-magnitude order of step 1, not the
//! component index order. The generator was trained on prompts laid out this
//! way.

use std::sync::Arc;

use image::RgbImage;
use tracing::debug;

use super::{ImageEmbedder, PipelineError};

/// Added to the min-max denominator so a constant selection does not divide by zero.
const NORMALIZE_EPSILON: f32 = 1e-8;

/// Intensity bucket for one normalized embedding component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticToken {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl SemanticToken {
    /// Bucket a normalized value. Boundaries are exclusive upper bounds:
    /// `< 0.2`, `< 0.4`, `< 0.6`, `< 0.8`, otherwise very high.
    ///
    /// NaN fails every comparison and lands in [`SemanticToken::VeryHigh`].
    pub fn from_normalized(value: f32) -> Self {
        if value < 0.2 {
            Self::VeryLow
        } else if value < 0.4 {
            Self::Low
        } else if value < 0.6 {
            Self::Medium
        } else if value < 0.8 {
            Self::High
        } else {
            Self::VeryHigh
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryLow => "very_low",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

impl std::fmt::Display for SemanticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indices of the `k` largest-magnitude components, in ascending magnitude
/// order (largest last). Equal magnitudes keep their original index order.
pub fn top_k_by_magnitude(values: &[f32], k: usize) -> Result<Vec<usize>, PipelineError> {
    if k == 0 || k > values.len() {
        return Err(PipelineError::InvalidTopK {
            top_k: k,
            dimension: values.len(),
        });
    }

    let mut order: Vec<usize> = (0..values.len()).collect();
    // sort_by is stable
    order.sort_by(|&a, &b| values[a].abs().total_cmp(&values[b].abs()));
    Ok(order.split_off(values.len() - k))
}

/// Scale to [0, 1] using the selection's own min and max.
pub fn min_max_normalize(values: &[f32]) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min + NORMALIZE_EPSILON;
    values.iter().map(|v| (v - min) / range).collect()
}

/// Map every normalized value to its bucket.
pub fn discretize(normalized: &[f32]) -> Vec<SemanticToken> {
    normalized
        .iter()
        .map(|&v| SemanticToken::from_normalized(v))
        .collect()
}

/// Full reduction of one embedding to a space-separated prompt of `k` words.
pub fn reduce_to_prompt(embedding: &[f32], k: usize) -> Result<String, PipelineError> {
    let indices = top_k_by_magnitude(embedding, k)?;
    // Signed values: magnitude only decides which components are kept
    let selected: Vec<f32> = indices.iter().map(|&i| embedding[i]).collect();
    let tokens = discretize(&min_max_normalize(&selected));

    Ok(tokens
        .iter()
        .map(SemanticToken::as_str)
        .collect::<Vec<_>>()
        .join(" "))
}

/// Image → prompt stage: runs the vision embedder, then [`reduce_to_prompt`].
pub struct EmbeddingToPrompt {
    embedder: Arc<dyn ImageEmbedder>,
    top_k: usize,
}

impl EmbeddingToPrompt {
    pub fn new(embedder: Arc<dyn ImageEmbedder>, top_k: usize) -> Self {
        Self { embedder, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    pub fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, PipelineError> {
        self.embedder.embed(image)
    }

    pub fn prompt_for_embedding(&self, embedding: &[f32]) -> Result<String, PipelineError> {
        let prompt = reduce_to_prompt(embedding, self.top_k)?;
        debug!(dimension = embedding.len(), top_k = self.top_k, "Embedding reduced to prompt");
        Ok(prompt)
    }

    pub fn prompt_for_image(&self, image: &RgbImage) -> Result<String, PipelineError> {
        let embedding = self.embed(image)?;
        self.prompt_for_embedding(&embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MockImageEmbedder;
    use image::Rgb;

    const TOY: [f32; 5] = [0.1, -0.9, 0.05, 0.5, -0.5];

    #[test]
    fn toy_vector_selects_by_magnitude_ascending() {
        // |v| ascending: 0.05(2) 0.1(0) 0.5(3) 0.5(4) 0.9(1)
        assert_eq!(top_k_by_magnitude(&TOY, 3).unwrap(), vec![3, 4, 1]);
    }

    #[test]
    fn toy_vector_prompt() {
        // selected 0.5, -0.5, -0.9 → normalized ~1.0, ~0.29, 0.0
        assert_eq!(reduce_to_prompt(&TOY, 3).unwrap(), "very_high low very_low");
    }

    #[test]
    fn prompt_has_exactly_k_tokens() {
        let embedding: Vec<f32> = (0..768).map(|i| ((i * 37) % 101) as f32 / 50.0 - 1.0).collect();
        let prompt = reduce_to_prompt(&embedding, 32).unwrap();
        assert_eq!(prompt.split(' ').count(), 32);
        assert!(!prompt.contains("  "));
        let labels = ["very_low", "low", "medium", "high", "very_high"];
        assert!(prompt.split(' ').all(|t| labels.contains(&t)), "{prompt}");
    }

    #[test]
    fn all_equal_values_are_very_low() {
        let prompt = reduce_to_prompt(&[0.5; 10], 4).unwrap();
        assert_eq!(prompt, "very_low very_low very_low very_low");
    }

    #[test]
    fn equal_magnitudes_keep_index_order() {
        // Same magnitude, opposite signs: stable sort keeps 0 before 1
        assert_eq!(top_k_by_magnitude(&[0.5, -0.5, 0.1], 2).unwrap(), vec![0, 1]);
        assert_eq!(reduce_to_prompt(&[0.5, -0.5, 0.1], 2).unwrap(), "very_high very_low");
    }

    #[test]
    fn k_equal_to_dimension_selects_everything() {
        let idx = top_k_by_magnitude(&TOY, 5).unwrap();
        assert_eq!(idx, vec![2, 0, 3, 4, 1]);
    }

    #[test]
    fn zero_k_rejected() {
        let err = reduce_to_prompt(&TOY, 0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTopK { top_k: 0, dimension: 5 }));
    }

    #[test]
    fn k_above_dimension_rejected() {
        let err = top_k_by_magnitude(&TOY, 6).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTopK { top_k: 6, dimension: 5 }));
    }

    #[test]
    fn empty_embedding_rejected() {
        assert!(reduce_to_prompt(&[], 1).is_err());
    }

    #[test]
    fn normalize_spans_unit_interval() {
        let n = min_max_normalize(&[2.0, 4.0, 6.0]);
        assert!(n[0].abs() < 1e-6);
        assert!((n[1] - 0.5).abs() < 1e-6);
        assert!((n[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn bucket_boundaries_are_exclusive() {
        assert_eq!(SemanticToken::from_normalized(0.0), SemanticToken::VeryLow);
        assert_eq!(SemanticToken::from_normalized(0.199), SemanticToken::VeryLow);
        assert_eq!(SemanticToken::from_normalized(0.2), SemanticToken::Low);
        assert_eq!(SemanticToken::from_normalized(0.4), SemanticToken::Medium);
        assert_eq!(SemanticToken::from_normalized(0.6), SemanticToken::High);
        assert_eq!(SemanticToken::from_normalized(0.8), SemanticToken::VeryHigh);
        assert_eq!(SemanticToken::from_normalized(1.0), SemanticToken::VeryHigh);
    }

    #[test]
    fn nan_maps_to_very_high() {
        assert_eq!(SemanticToken::from_normalized(f32::NAN), SemanticToken::VeryHigh);
    }

    #[test]
    fn token_strings() {
        let words: Vec<&str> = [
            SemanticToken::VeryLow,
            SemanticToken::Low,
            SemanticToken::Medium,
            SemanticToken::High,
            SemanticToken::VeryHigh,
        ]
        .iter()
        .map(SemanticToken::as_str)
        .collect();
        assert_eq!(words, ["very_low", "low", "medium", "high", "very_high"]);
        assert_eq!(SemanticToken::Medium.to_string(), "medium");
    }

    #[test]
    fn reduction_is_deterministic() {
        let embedding: Vec<f32> = (0..256).map(|i| (i as f32 * 0.37).sin()).collect();
        assert_eq!(
            reduce_to_prompt(&embedding, 16).unwrap(),
            reduce_to_prompt(&embedding, 16).unwrap()
        );
    }

    #[test]
    fn stage_runs_embedder_then_reduces() {
        let stage = EmbeddingToPrompt::new(Arc::new(MockImageEmbedder::new(64)), 8);
        let img = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, 128]));
        let prompt = stage.prompt_for_image(&img).unwrap();
        assert_eq!(prompt.split(' ').count(), 8);
        assert_eq!(stage.top_k(), 8);
        assert_eq!(stage.embedder_name(), "mock");
    }

    #[test]
    fn stage_rejects_k_larger_than_embedding() {
        let stage = EmbeddingToPrompt::new(Arc::new(MockImageEmbedder::new(4)), 8);
        let img = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        assert!(matches!(
            stage.prompt_for_image(&img),
            Err(PipelineError::InvalidTopK { top_k: 8, dimension: 4 })
        ));
    }
}
