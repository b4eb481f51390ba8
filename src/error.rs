//! Error types for the triage inference service

use std::path::PathBuf;
use thiserror::Error;

/// Startup-fatal errors raised while building the model.
///
/// None of these are recoverable at runtime; the process must not start
/// serving when the loader fails.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Checkpoint file does not exist.
    #[error("checkpoint not found: {}", .0.display())]
    CheckpointNotFound(PathBuf),

    /// Checkpoint exists but cannot be read as a known format.
    #[error("unreadable checkpoint: {0}")]
    Checkpoint(String),

    /// Checkpoint has no `model_state_dict` entry.
    #[error("checkpoint {} has no `model_state_dict` entry", .0.display())]
    MissingStateDict(PathBuf),

    /// Invalid or unavailable compute device.
    #[error("device error: {0}")]
    Device(String),

    /// Tensor-level failure while instantiating the network (missing weight,
    /// shape mismatch against the declared architecture, ...).
    #[error("model build failed: {0}")]
    Candle(#[from] candle_core::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request-local errors raised inside the prediction pipeline.
///
/// All of them are caught at the handler boundary and translated to a single
/// wire-level error shape; none crash the process.
#[derive(Debug, Error)]
pub enum PredictError {
    /// The multipart upload could not be read.
    #[error("upload error: {0}")]
    Upload(String),

    /// The uploaded bytes are not a decodable image.
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    /// The forward pass failed.
    #[error("inference failed: {0}")]
    Inference(#[from] candle_core::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_display() {
        let err = ModelError::CheckpointNotFound(PathBuf::from("model/best_model.safetensors"));
        assert_eq!(
            format!("{}", err),
            "checkpoint not found: model/best_model.safetensors"
        );

        let err = ModelError::MissingStateDict(PathBuf::from("ckpt.pt"));
        assert_eq!(
            format!("{}", err),
            "checkpoint ckpt.pt has no `model_state_dict` entry"
        );
    }

    #[test]
    fn test_predict_error_display() {
        let err = PredictError::Upload("no `file` field in multipart body".to_string());
        assert_eq!(
            format!("{}", err),
            "upload error: no `file` field in multipart body"
        );
    }
}
