//! Image preprocessing for chest X-ray model inference.
//!
//! This module turns uploaded image bytes into the normalized input tensor
//! the network was trained on. The transform must match the training
//! pipeline exactly: RGB, direct 224x224 resize, ImageNet normalization.

use candle_core::{DType, Device, Tensor};
use image::imageops::FilterType;

use crate::error::PredictError;

/// Input edge length expected by the backbone
pub const IMAGE_SIZE: u32 = 224;

/// ImageNet channel means the backbone was fine-tuned under
pub const NORMALIZE_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations
pub const NORMALIZE_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocessor that transforms raw image bytes into model input tensors.
///
/// Matches the training-time transform: convert to RGB, resize to
/// 224x224 (bilinear, no aspect-ratio preservation), scale to [0,1] and
/// normalize per channel.
pub struct ImagePreprocessor {
    size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl ImagePreprocessor {
    /// Create a preprocessor with the training-time constants.
    pub fn new() -> Self {
        Self {
            size: IMAGE_SIZE,
            mean: NORMALIZE_MEAN,
            std: NORMALIZE_STD,
        }
    }

    /// Decode image bytes and produce a `1x3xSxS` f32 tensor on `device`.
    ///
    /// Any source format (grayscale, RGBA, palette, ...) is converted to
    /// 3-channel RGB before resizing.
    pub fn preprocess(&self, bytes: &[u8], device: &Device) -> Result<Tensor, PredictError> {
        let rgb = image::load_from_memory(bytes)?.to_rgb8();
        let resized = image::imageops::resize(&rgb, self.size, self.size, FilterType::Triangle);
        let data = resized.into_raw();

        let side = self.size as usize;
        // HWC u8 -> CHW f32 in [0,1]
        let tensor = Tensor::from_vec(data, (side, side, 3), device)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?
            .affine(1.0 / 255.0, 0.0)?;

        let mean = Tensor::from_vec(self.mean.to_vec(), (3, 1, 1), device)?;
        let std = Tensor::from_vec(self.std.to_vec(), (3, 1, 1), device)?;

        let normalized = tensor.broadcast_sub(&mean)?.broadcast_div(&std)?;
        Ok(normalized.unsqueeze(0)?)
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}
