//! Model construction and checkpoint loading

use candle_core::{Device, Tensor};

pub mod classifier;
pub mod loader;

pub use classifier::CxrClassifier;
pub use loader::{DevicePreference, ModelLoader};

/// Trait for types that can produce class logits from a batched input.
///
/// This is the seam between the HTTP pipeline and the network, allowing
/// scripted implementations in tests.
pub trait Classifier: Send + Sync {
    /// Run a forward pass, returning raw logits of shape `(batch, classes)`.
    fn logits(&self, input: &Tensor) -> candle_core::Result<Tensor>;

    /// Device that inputs must be placed on.
    fn device(&self) -> &Device;
}
