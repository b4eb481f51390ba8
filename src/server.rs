//! HTTP surface and prediction pipeline for the triage service

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use candle_core::Tensor;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::PredictError;
use crate::model::Classifier;
use crate::preprocess::ImagePreprocessor;
use crate::types::{PredictResponse, PredictionSet};

/// Stateless request pipeline: (model, image bytes) -> prediction set.
///
/// Shared read-only across requests through the router state; the only
/// mutable data during a request is request-local.
pub struct PredictionPipeline {
    preprocessor: ImagePreprocessor,
    model: Box<dyn Classifier>,
}

impl PredictionPipeline {
    /// Create a pipeline around a loaded classifier.
    pub fn new(model: Box<dyn Classifier>) -> Self {
        Self {
            preprocessor: ImagePreprocessor::new(),
            model,
        }
    }

    /// Run preprocessing, the forward pass and sigmoid activation.
    ///
    /// Sigmoid is applied independently per class: this is a multi-label
    /// model and probabilities do not sum to 1.
    pub fn predict(&self, bytes: &[u8]) -> Result<PredictionSet, PredictError> {
        let input = self.preprocessor.preprocess(bytes, self.model.device())?;
        let logits = self.model.logits(&input)?;
        let probs = candle_nn::ops::sigmoid(&logits)?;

        Ok(PredictionSet::from_probabilities(&squeeze_all(&probs)?))
    }
}

/// Drop every singleton dimension and return the probabilities as a vector.
///
/// A head with a single output squeezes all the way down to a bare scalar;
/// it is re-wrapped so pairing with class names still yields one entry.
fn squeeze_all(probs: &Tensor) -> candle_core::Result<Vec<f32>> {
    let mut squeezed = probs.clone();
    while let Some(dim) = squeezed.dims().iter().position(|&d| d == 1) {
        squeezed = squeezed.squeeze(dim)?;
    }

    if squeezed.rank() == 0 {
        return Ok(vec![squeezed.to_scalar::<f32>()?]);
    }
    squeezed.to_vec1::<f32>()
}

/// Build the application router with the single prediction route.
pub fn router(pipeline: Arc<PredictionPipeline>, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(pipeline)
}

/// `POST /predict`: one uploaded image in, pathology probabilities out.
async fn predict(
    State(pipeline): State<Arc<PredictionPipeline>>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>, PredictError> {
    let started = Instant::now();

    let bytes = read_upload(multipart).await?;
    let predictions = pipeline.predict(&bytes)?;

    debug!(
        bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Prediction served"
    );

    Ok(Json(PredictResponse {
        predictions: predictions.response(),
    }))
}

/// Read the uploaded `file` field fully into memory.
async fn read_upload(mut multipart: Multipart) -> Result<axum::body::Bytes, PredictError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PredictError::Upload(e.to_string()))?
    {
        if field.name() == Some("file") {
            return field
                .bytes()
                .await
                .map_err(|e| PredictError::Upload(e.to_string()));
        }
    }

    Err(PredictError::Upload(
        "no `file` field in multipart body".to_string(),
    ))
}

/// The single translation point from pipeline errors to the wire: every
/// request-local failure becomes HTTP 500 with an `error` body.
impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        warn!(error = %self, "Prediction request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
