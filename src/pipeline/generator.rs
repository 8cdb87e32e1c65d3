use super::PipelineError;

/// Text-to-text model producing free-form findings from a semantic prompt.
pub trait FindingsGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, PipelineError>;

    fn name(&self) -> &str;
}

/// Index of the largest logit. The first occurrence wins on ties.
pub fn greedy_argmax(logits: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in logits.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// The logits row for the last decoder position of a `[1, steps, vocab]` output.
pub fn last_step_logits<'a>(shape: &[i64], logits: &'a [f32]) -> Result<&'a [f32], PipelineError> {
    let (steps, vocab) = match shape {
        [1, steps, vocab] if *steps > 0 && *vocab > 0 => (*steps as usize, *vocab as usize),
        _ => {
            return Err(PipelineError::Generation(format!(
                "Unexpected logits shape: {shape:?}, expected [1, steps, vocab]"
            )))
        }
    };
    if logits.len() != steps * vocab {
        return Err(PipelineError::Generation(format!(
            "Logits have {} values, shape {shape:?} needs {}",
            logits.len(),
            steps * vocab
        )));
    }
    Ok(&logits[(steps - 1) * vocab..])
}

// ═══════════════════════════════════════════════════════════
// ONNX encoder-decoder (behind `onnx-models` feature)
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx-models")]
mod onnx {
    use super::{greedy_argmax, last_step_logits, FindingsGenerator, PipelineError};
    use crate::config::GenerationConfig;
    use crate::hardware::InferenceDevice;
    use crate::pipeline::runtime::build_session;
    use ort::session::Session;
    use ort::value::TensorRef;
    use std::path::Path;
    use std::sync::Mutex;
    use tokenizers::{Tokenizer, TruncationParams};

    /// Fine-tuned T5-style seq2seq model exported as separate encoder and
    /// decoder graphs (no KV cache), decoded greedily.
    ///
    /// Model directory layout:
    /// - `encoder_model.onnx`: `input_ids`, `attention_mask` → `last_hidden_state`
    /// - `decoder_model.onnx`: `input_ids`, `encoder_attention_mask`,
    ///   `encoder_hidden_states` → `logits`
    /// - `tokenizer.json`
    pub struct OnnxSeq2SeqGenerator {
        encoder: Mutex<Session>,
        decoder: Mutex<Session>,
        tokenizer: Tokenizer,
        config: GenerationConfig,
    }

    impl OnnxSeq2SeqGenerator {
        pub fn load(
            model_dir: &Path,
            device: InferenceDevice,
            intra_threads: usize,
            config: GenerationConfig,
        ) -> Result<Self, PipelineError> {
            let tokenizer_path = model_dir.join("tokenizer.json");
            if !tokenizer_path.exists() {
                return Err(PipelineError::ModelNotFound(tokenizer_path));
            }
            let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| PipelineError::Tokenization(format!("Tokenizer load: {e}")))?;
            tokenizer
                .with_truncation(Some(TruncationParams {
                    max_length: config.max_input_tokens,
                    ..Default::default()
                }))
                .map_err(|e| PipelineError::Tokenization(format!("Truncation setup: {e}")))?;
            tokenizer.with_padding(None);

            let encoder = build_session(&model_dir.join("encoder_model.onnx"), device, intra_threads)?;
            let decoder = build_session(&model_dir.join("decoder_model.onnx"), device, intra_threads)?;

            Ok(Self {
                encoder: Mutex::new(encoder),
                decoder: Mutex::new(decoder),
                tokenizer,
                config,
            })
        }

        fn encode(&self, prompt: &str) -> Result<(Vec<i64>, Vec<i64>), PipelineError> {
            let encoding = self
                .tokenizer
                .encode(prompt, true)
                .map_err(|e| PipelineError::Tokenization(e.to_string()))?;
            let ids = encoding.get_ids().iter().map(|&id| id as i64).collect();
            let mask = encoding
                .get_attention_mask()
                .iter()
                .map(|&m| m as i64)
                .collect();
            Ok((ids, mask))
        }
    }

    impl FindingsGenerator for OnnxSeq2SeqGenerator {
        fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
            let (input_ids, attention_mask) = self.encode(prompt)?;
            let seq_len = input_ids.len();
            if seq_len == 0 {
                return Err(PipelineError::Tokenization("Prompt encoded to zero tokens".into()));
            }

            let ids_array = ndarray::Array2::from_shape_vec((1, seq_len), input_ids)
                .map_err(|e| PipelineError::Generation(e.to_string()))?;
            let mask_array = ndarray::Array2::from_shape_vec((1, seq_len), attention_mask)
                .map_err(|e| PipelineError::Generation(e.to_string()))?;

            // Encoder pass, once per prompt
            let hidden_array = {
                let ids_tensor = TensorRef::from_array_view(&ids_array)
                    .map_err(|e| PipelineError::Generation(e.to_string()))?;
                let mask_tensor = TensorRef::from_array_view(&mask_array)
                    .map_err(|e| PipelineError::Generation(e.to_string()))?;

                let mut encoder = self
                    .encoder
                    .lock()
                    .map_err(|_| PipelineError::Generation("Encoder lock poisoned".to_string()))?;
                let outputs = encoder
                    .run(ort::inputs![
                        "input_ids" => ids_tensor,
                        "attention_mask" => mask_tensor
                    ])
                    .map_err(|e| PipelineError::Generation(format!("Encoder inference: {e}")))?;
                let hidden = outputs.get("last_hidden_state").ok_or_else(|| {
                    PipelineError::Generation("Encoder has no last_hidden_state output".to_string())
                })?;
                let (shape, data) = hidden
                    .try_extract_tensor::<f32>()
                    .map_err(|e| PipelineError::Generation(format!("Encoder output: {e}")))?;
                let hidden_dim = match shape[..] {
                    [1, steps, dim] if steps as usize == seq_len && dim > 0 => dim as usize,
                    _ => {
                        return Err(PipelineError::Generation(format!(
                            "Unexpected encoder output shape: {shape:?}"
                        )))
                    }
                };
                ndarray::Array3::from_shape_vec((1, seq_len, hidden_dim), data.to_vec())
                    .map_err(|e| PipelineError::Generation(e.to_string()))?
            };

            let mut decoder = self
                .decoder
                .lock()
                .map_err(|_| PipelineError::Generation("Decoder lock poisoned".to_string()))?;

            let eos = self.config.eos_token_id as i64;
            let mut generated: Vec<i64> = vec![self.config.decoder_start_token_id as i64];

            for _ in 0..self.config.max_new_tokens {
                let dec_array = ndarray::Array2::from_shape_vec((1, generated.len()), generated.clone())
                    .map_err(|e| PipelineError::Generation(e.to_string()))?;
                let dec_tensor = TensorRef::from_array_view(&dec_array)
                    .map_err(|e| PipelineError::Generation(e.to_string()))?;
                let mask_tensor = TensorRef::from_array_view(&mask_array)
                    .map_err(|e| PipelineError::Generation(e.to_string()))?;
                let hidden_tensor = TensorRef::from_array_view(&hidden_array)
                    .map_err(|e| PipelineError::Generation(e.to_string()))?;

                let outputs = decoder
                    .run(ort::inputs![
                        "input_ids" => dec_tensor,
                        "encoder_attention_mask" => mask_tensor,
                        "encoder_hidden_states" => hidden_tensor
                    ])
                    .map_err(|e| PipelineError::Generation(format!("Decoder inference: {e}")))?;
                let logits = outputs.get("logits").ok_or_else(|| {
                    PipelineError::Generation("Decoder has no logits output".to_string())
                })?;
                let (shape, data) = logits
                    .try_extract_tensor::<f32>()
                    .map_err(|e| PipelineError::Generation(format!("Decoder output: {e}")))?;

                let next = last_step_logits(shape, data)
                    .and_then(|row| {
                        greedy_argmax(row)
                            .ok_or_else(|| PipelineError::Generation("Empty logits row".to_string()))
                    })? as i64;
                if next == eos {
                    break;
                }
                generated.push(next);
            }

            let ids: Vec<u32> = generated[1..].iter().map(|&id| id as u32).collect();
            tracing::debug!(generated_tokens = ids.len(), "Greedy decode finished");

            self.tokenizer
                .decode(&ids, true)
                .map_err(|e| PipelineError::Tokenization(format!("Decode: {e}")))
        }

        fn name(&self) -> &str {
            "onnx-seq2seq"
        }
    }
}

#[cfg(feature = "onnx-models")]
pub use onnx::OnnxSeq2SeqGenerator;

/// Returns a fixed response regardless of prompt. Test double only; the
/// service itself never runs without real model weights.
pub struct ScriptedGenerator {
    response: String,
}

impl ScriptedGenerator {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

impl FindingsGenerator for ScriptedGenerator {
    fn generate(&self, _prompt: &str) -> Result<String, PipelineError> {
        Ok(self.response.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_picks_largest() {
        assert_eq!(greedy_argmax(&[0.1, 2.5, -1.0, 2.4]), Some(1));
    }

    #[test]
    fn argmax_first_wins_on_tie() {
        assert_eq!(greedy_argmax(&[3.0, 1.0, 3.0]), Some(0));
    }

    #[test]
    fn argmax_all_negative() {
        assert_eq!(greedy_argmax(&[-5.0, -0.5, -2.0]), Some(1));
    }

    #[test]
    fn argmax_empty_is_none() {
        assert_eq!(greedy_argmax(&[]), None);
    }

    #[test]
    fn last_step_selects_final_row() {
        // 2 steps x 3 vocab
        let logits = [0.0, 1.0, 2.0, 9.0, 8.0, 7.0];
        let row = last_step_logits(&[1, 2, 3], &logits).unwrap();
        assert_eq!(row, &[9.0, 8.0, 7.0]);
        assert_eq!(greedy_argmax(row), Some(0));
    }

    #[test]
    fn last_step_rejects_bad_shape() {
        assert!(last_step_logits(&[2, 3], &[0.0; 6]).is_err());
        assert!(last_step_logits(&[1, 0, 3], &[]).is_err());
    }

    #[test]
    fn last_step_rejects_length_mismatch() {
        let err = last_step_logits(&[1, 2, 3], &[0.0; 5]).unwrap_err();
        assert!(matches!(err, PipelineError::Generation(_)));
    }

    #[test]
    fn scripted_ignores_prompt() {
        let generator = ScriptedGenerator::new("heart size normal");
        assert_eq!(generator.generate("very_high low").unwrap(), "heart size normal");
        assert_eq!(generator.generate("").unwrap(), "heart size normal");
    }
}
