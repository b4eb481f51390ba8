//! Chest X-ray Triage Inference Service
//!
//! Loads a ResNet-50 chest X-ray classifier once at startup and serves
//! multi-label pathology probabilities over a single HTTP endpoint.

pub mod config;
pub mod error;
pub mod model;
pub mod preprocess;
pub mod server;
pub mod types;

pub use config::AppConfig;
pub use error::{ModelError, PredictError};
pub use model::{Classifier, CxrClassifier, ModelLoader};
pub use preprocess::ImagePreprocessor;
pub use server::PredictionPipeline;
pub use types::{PredictResponse, Predictions};
