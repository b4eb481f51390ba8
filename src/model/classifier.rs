//! Network definition for the chest X-ray classifier.
//!
//! ResNet-50 backbone with the same custom classification head the
//! checkpoint was trained with:
//! `Dropout(0.5) -> Linear(2048->512) -> BatchNorm1d(512) -> ReLU ->
//! Dropout(0.3) -> Linear(512->4)`.

use candle_core::{Device, Tensor};
use candle_nn::{batch_norm, linear, BatchNorm, Dropout, Func, Linear, Module, ModuleT, VarBuilder};
use candle_transformers::models::resnet;

use crate::error::ModelError;
use crate::model::Classifier;
use crate::types::NUM_CLASSES;

/// Pooled feature width of the ResNet-50 backbone
const BACKBONE_FEATURES: usize = 2048;

/// Hidden width of the classification head
const HEAD_HIDDEN: usize = 512;

/// Classification head replacing the backbone's final layer.
///
/// Weight names follow the indices of the sequential head used in training
/// (`fc.1` Linear, `fc.2` BatchNorm1d, `fc.5` Linear); the dropout and ReLU
/// slots carry no weights. Every forward pass runs the inference path:
/// dropout is inert and batch norm uses running statistics.
struct ClassificationHead {
    dropout1: Dropout,
    fc1: Linear,
    bn: BatchNorm,
    dropout2: Dropout,
    fc2: Linear,
}

impl ClassificationHead {
    fn new(vb: VarBuilder) -> candle_core::Result<Self> {
        let fc1 = linear(BACKBONE_FEATURES, HEAD_HIDDEN, vb.pp("1"))?;
        let bn = batch_norm(HEAD_HIDDEN, 1e-5, vb.pp("2"))?;
        let fc2 = linear(HEAD_HIDDEN, NUM_CLASSES, vb.pp("5"))?;

        Ok(Self {
            dropout1: Dropout::new(0.5),
            fc1,
            bn,
            dropout2: Dropout::new(0.3),
            fc2,
        })
    }

    fn forward(&self, features: &Tensor) -> candle_core::Result<Tensor> {
        let x = self.dropout1.forward(features, false)?;
        let x = self.fc1.forward(&x)?;
        let x = self.bn.forward_t(&x, false)?;
        let x = x.relu()?;
        let x = self.dropout2.forward(&x, false)?;
        self.fc2.forward(&x)
    }
}

/// Chest X-ray classifier: ResNet-50 backbone plus custom head.
///
/// Immutable once constructed; shared read-only across requests.
pub struct CxrClassifier {
    backbone: Func<'static>,
    head: ClassificationHead,
    device: Device,
}

impl CxrClassifier {
    /// Instantiate the network from a weight source.
    ///
    /// Backbone weights live at the root of the state dict, head weights
    /// under `fc.`. Missing tensors or shape mismatches against this
    /// architecture surface as [`ModelError::Candle`].
    pub fn new(vb: VarBuilder<'static>, device: Device) -> Result<Self, ModelError> {
        let backbone = resnet::resnet50_no_final_layer(vb.clone())?;
        let head = ClassificationHead::new(vb.pp("fc"))?;

        Ok(Self {
            backbone,
            head,
            device,
        })
    }

    fn forward(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        let features = self.backbone.forward(input)?;
        self.head.forward(&features)
    }
}

impl Classifier for CxrClassifier {
    fn logits(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        self.forward(input)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}
