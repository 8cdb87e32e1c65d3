//! Image decoding and vision-encoder input preparation.
//!
//! Two independent steps:
//! 1. [`decode_rgb`] turns uploaded bytes into an RGB raster (any size).
//!    This is the image that goes into the PDF.
//! 2. [`VisionPreprocessor::prepare`] turns that raster into the CHW `f32`
//!    tensor the encoder was trained on (resize shortest edge, center crop,
//!    rescale, normalize).

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat, RgbImage};
use tracing::debug;

use super::PipelineError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Maximum input image size (in bytes) before rejecting.
/// Prevents OOM on corrupt/adversarial files.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Minimum valid image size in bytes (smallest valid PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

// ═══════════════════════════════════════════════════════════
// Decoding
// ═══════════════════════════════════════════════════════════

/// Reject byte buffers that cannot plausibly be an image.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), PipelineError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(PipelineError::ImageDecode(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(PipelineError::ImageDecode(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Decode PNG/JPEG bytes and convert to 3-channel RGB.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    validate_image_bytes(bytes)?;

    let img = image::load_from_memory(bytes)
        .map_err(|e| PipelineError::ImageDecode(format!("Failed to decode image: {e}")))?;
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(PipelineError::ImageDecode("Image has zero area".into()));
    }

    debug!(dimensions = format!("{w}x{h}"), color = ?img.color(), "Image decoded");
    Ok(img.to_rgb8())
}

/// Encode an RGB image as JPEG bytes (used for the copy stored beside the PDF).
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let dynamic = DynamicImage::ImageRgb8(img.clone());
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, ImageOutputFormat::Jpeg(quality))
        .map_err(|e| PipelineError::ImageProcessing(format!("JPEG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

// ═══════════════════════════════════════════════════════════
// Encoder input
// ═══════════════════════════════════════════════════════════

/// What the vision encoder expects. Changes per model, not per request.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionInputConfig {
    /// The shortest edge is resized to this length before cropping.
    pub shortest_edge: u32,
    /// Square center-crop size fed to the encoder.
    pub crop_size: u32,
    /// Per-channel mean applied after rescaling to [0, 1].
    pub image_mean: [f32; 3],
    /// Per-channel standard deviation.
    pub image_std: [f32; 3],
}

impl VisionInputConfig {
    /// RAD-DINO (DINOv2 ViT-B/14 trained on chest radiographs).
    pub fn rad_dino() -> Self {
        Self {
            shortest_edge: 518,
            crop_size: 518,
            image_mean: [0.5307, 0.5307, 0.5307],
            image_std: [0.2583, 0.2583, 0.2583],
        }
    }
}

impl Default for VisionInputConfig {
    fn default() -> Self {
        Self::rad_dino()
    }
}

/// Encoder-ready pixel data in CHW order, batch size 1.
#[derive(Debug, Clone)]
pub struct PixelTensor {
    /// `[1, 3, height, width]`
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

/// Resize + center crop + normalize, matching the encoder's training transform.
#[derive(Debug, Clone, Default)]
pub struct VisionPreprocessor {
    config: VisionInputConfig,
}

impl VisionPreprocessor {
    pub fn new(config: VisionInputConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VisionInputConfig {
        &self.config
    }

    pub fn prepare(&self, image: &RgbImage) -> Result<PixelTensor, PipelineError> {
        let crop = self.config.crop_size;
        if crop == 0 || self.config.shortest_edge == 0 {
            return Err(PipelineError::ImageProcessing(
                "Crop size and shortest edge must be positive".into(),
            ));
        }

        let (w, h) = shortest_edge_dimensions(image.width(), image.height(), self.config.shortest_edge);
        let resized = image::imageops::resize(image, w, h, FilterType::CatmullRom);

        // Images smaller than the crop after resizing are edge-padded with zeros,
        // the same as the reference processor.
        let offset_x = (w as i64 - crop as i64) / 2;
        let offset_y = (h as i64 - crop as i64) / 2;

        let size = crop as usize;
        let plane = size * size;
        let mut data = vec![0.0f32; 3 * plane];

        for y in 0..size {
            for x in 0..size {
                let src_x = x as i64 + offset_x;
                let src_y = y as i64 + offset_y;
                let rgb = if src_x >= 0 && src_y >= 0 && (src_x as u32) < w && (src_y as u32) < h {
                    resized.get_pixel(src_x as u32, src_y as u32).0
                } else {
                    [0, 0, 0]
                };
                let idx = y * size + x;
                for c in 0..3 {
                    let scaled = rgb[c] as f32 / 255.0;
                    data[c * plane + idx] = (scaled - self.config.image_mean[c]) / self.config.image_std[c];
                }
            }
        }

        debug!(
            original = format!("{}x{}", image.width(), image.height()),
            resized = format!("{w}x{h}"),
            crop,
            "Image prepared for vision encoder"
        );

        Ok(PixelTensor {
            shape: [1, 3, size, size],
            data,
        })
    }
}

/// Scale so the shorter side equals `shortest_edge`, keeping aspect ratio.
/// The longer side is truncated, as the reference processor does.
pub fn shortest_edge_dimensions(width: u32, height: u32, shortest_edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (shortest_edge, shortest_edge);
    }
    if width <= height {
        let new_h = ((shortest_edge as u64 * height as u64) / width as u64) as u32;
        (shortest_edge, new_h.max(1))
    } else {
        let new_w = ((shortest_edge as u64 * width as u64) / height as u64) as u32;
        (new_w.max(1), shortest_edge)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
