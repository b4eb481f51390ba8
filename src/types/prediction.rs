//! Prediction data structures for chest X-ray triage

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Class labels in training order. The index of each label matches the
/// position of its logit in the model output.
pub const CLASS_NAMES: [&str; 4] = ["no_finding", "nodule", "pneumonia", "pneumothorax"];

/// Number of output classes
pub const NUM_CLASSES: usize = CLASS_NAMES.len();

/// Full per-class probability mapping for one image, rounded to 4 decimals.
///
/// Holds all classes including `no_finding`; the wire response is the
/// pathology subset produced by [`PredictionSet::response`].
#[derive(Debug, Clone)]
pub struct PredictionSet {
    probabilities: HashMap<&'static str, f64>,
}

impl PredictionSet {
    /// Build the mapping by pairing class names with sigmoid probabilities.
    ///
    /// Pairing stops at the shorter of the two sequences, so a truncated
    /// probability vector yields a partial mapping rather than a panic.
    pub fn from_probabilities(probs: &[f32]) -> Self {
        let probabilities = CLASS_NAMES
            .iter()
            .copied()
            .zip(probs.iter())
            .map(|(name, &p)| (name, round4(f64::from(p))))
            .collect();

        Self { probabilities }
    }

    /// Rounded probability for a label, 0.0 when absent.
    pub fn probability(&self, label: &str) -> f64 {
        self.probabilities.get(label).copied().unwrap_or(0.0)
    }

    /// The pathology subset returned to callers. `no_finding` is computed
    /// but deliberately withheld from the response.
    pub fn response(&self) -> Predictions {
        Predictions {
            pneumothorax: self.probability("pneumothorax"),
            pneumonia: self.probability("pneumonia"),
            nodule: self.probability("nodule"),
        }
    }
}

/// Pathology probabilities returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predictions {
    pub pneumothorax: f64,
    pub pneumonia: f64,
    pub nodule: f64,
}

/// Success response body for `POST /predict`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predictions: Predictions,
}

fn round4(p: f64) -> f64 {
    (p * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding_to_four_decimals() {
        let set = PredictionSet::from_probabilities(&[0.123_456, 0.5, 0.000_04, 0.999_96]);
        assert_eq!(set.probability("no_finding"), 0.1235);
        assert_eq!(set.probability("nodule"), 0.5);
        assert_eq!(set.probability("pneumonia"), 0.0);
        assert_eq!(set.probability("pneumothorax"), 1.0);
    }

    #[test]
    fn test_response_withholds_no_finding() {
        let set = PredictionSet::from_probabilities(&[0.9, 0.1, 0.2, 0.3]);
        let response = set.response();

        assert_eq!(response.pneumothorax, 0.3);
        assert_eq!(response.pneumonia, 0.2);
        assert_eq!(response.nodule, 0.1);

        let json = serde_json::to_value(&response).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 3);
        assert!(!keys.contains(&"no_finding"));
    }

    #[test]
    fn test_short_probability_vector() {
        // A single-logit output still maps to a valid (partial) set
        let set = PredictionSet::from_probabilities(&[0.7]);
        assert_eq!(set.probability("no_finding"), 0.7);
        assert_eq!(set.probability("pneumothorax"), 0.0);
    }

    #[test]
    fn test_predict_response_serialization() {
        let set = PredictionSet::from_probabilities(&[0.5, 0.5, 0.5, 0.5]);
        let body = PredictResponse {
            predictions: set.response(),
        };

        let json = serde_json::to_string(&body).unwrap();
        let parsed: PredictResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.predictions.pneumothorax, 0.5);
        assert!(json.starts_with("{\"predictions\":"));
    }
}
