//! Type definitions for the triage inference service

pub mod prediction;

pub use prediction::{PredictResponse, PredictionSet, Predictions, CLASS_NAMES, NUM_CLASSES};
