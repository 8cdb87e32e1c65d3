//! Inference device selection.
//!
//! Decided once at start-up from the configured preference and, for `auto`,
//! whether the ONNX Runtime CUDA provider can be registered on this machine.
//! The result is process-wide; sessions are built for it and never re-targeted.

use serde::{Deserialize, Serialize};

use crate::config::DevicePreference;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Device all model sessions run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceDevice {
    /// NVIDIA GPU through the CUDA execution provider.
    Cuda,
    /// Default CPU execution provider.
    Cpu,
}

impl std::fmt::Display for InferenceDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cuda => write!(f, "CUDA"),
            Self::Cpu => write!(f, "CPU"),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Detection
// ═══════════════════════════════════════════════════════════

/// Whether the CUDA execution provider is usable in this process.
#[cfg(feature = "onnx-models")]
pub fn cuda_available() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

    match CUDAExecutionProvider::default().is_available() {
        Ok(available) => available,
        Err(e) => {
            tracing::warn!(error = %e, "CUDA provider probe failed, assuming unavailable");
            false
        }
    }
}

/// Without the ONNX runtime compiled in there is nothing to accelerate.
#[cfg(not(feature = "onnx-models"))]
pub fn cuda_available() -> bool {
    false
}

/// Resolve the configured preference to a concrete device.
pub fn resolve_device(preference: DevicePreference) -> InferenceDevice {
    resolve_with_probe(preference, cuda_available)
}

fn resolve_with_probe(preference: DevicePreference, probe: impl FnOnce() -> bool) -> InferenceDevice {
    let _span = tracing::info_span!("device_select", ?preference).entered();

    let device = match preference {
        DevicePreference::Cpu => InferenceDevice::Cpu,
        // Forced without probing. ONNX Runtime warns and stays on CPU if registration fails.
        DevicePreference::Cuda => InferenceDevice::Cuda,
        DevicePreference::Auto => {
            if probe() {
                InferenceDevice::Cuda
            } else {
                InferenceDevice::Cpu
            }
        }
    };

    tracing::info!(%device, "Inference device selected");
    device
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
