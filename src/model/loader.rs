//! Checkpoint loading for the chest X-ray classifier

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::model::classifier::CxrClassifier;

/// Checkpoint dictionary entry holding the network weights
const STATE_DICT_KEY: &str = "model_state_dict";

/// Compute device preference parsed from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevicePreference {
    /// Probe CUDA, then Metal, then fall back to CPU.
    Auto,
    /// CPU only.
    Cpu,
    /// CUDA device with index.
    Cuda(usize),
    /// Metal device with index.
    Metal(usize),
}

impl FromStr for DevicePreference {
    type Err = ModelError;

    /// Parse a device string like "auto", "cpu", "cuda", "cuda:1", "metal".
    fn from_str(s: &str) -> Result<Self, ModelError> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda(0)),
            "metal" => Ok(Self::Metal(0)),
            _ => {
                if let Some(idx) = s.strip_prefix("cuda:") {
                    let index = idx
                        .parse()
                        .map_err(|_| ModelError::Device(format!("invalid CUDA index: {idx}")))?;
                    Ok(Self::Cuda(index))
                } else if let Some(idx) = s.strip_prefix("metal:") {
                    let index = idx
                        .parse()
                        .map_err(|_| ModelError::Device(format!("invalid Metal index: {idx}")))?;
                    Ok(Self::Metal(index))
                } else {
                    Err(ModelError::Device(format!("invalid device: {s}")))
                }
            }
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(idx) => write!(f, "cuda:{idx}"),
            Self::Metal(idx) => write!(f, "metal:{idx}"),
        }
    }
}

/// Pick a device for a preference.
///
/// `Auto` takes the first available accelerator; an explicit accelerator
/// preference fails when the hardware is absent.
pub fn select_device(preference: &DevicePreference) -> Result<Device, ModelError> {
    match preference {
        DevicePreference::Cpu => Ok(Device::Cpu),
        DevicePreference::Cuda(index) => Device::new_cuda(*index)
            .map_err(|e| ModelError::Device(format!("cuda:{index} unavailable: {e}"))),
        DevicePreference::Metal(index) => Device::new_metal(*index)
            .map_err(|e| ModelError::Device(format!("metal:{index} unavailable: {e}"))),
        DevicePreference::Auto => {
            match Device::new_cuda(0) {
                Ok(device) => {
                    info!("Using CUDA device 0");
                    return Ok(device);
                }
                Err(e) => debug!("CUDA not available: {e}"),
            }
            match Device::new_metal(0) {
                Ok(device) => {
                    info!("Using Metal device 0");
                    return Ok(device);
                }
                Err(e) => debug!("Metal not available: {e}"),
            }
            info!("Using CPU device");
            Ok(Device::Cpu)
        }
    }
}

/// Loader that builds a ready-to-infer classifier from a checkpoint file.
///
/// Runs once at startup; every failure here is fatal and the process must
/// not begin serving.
pub struct ModelLoader {
    checkpoint_path: PathBuf,
    device: Device,
}

impl ModelLoader {
    /// Create a loader from model configuration, resolving the device.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        let preference: DevicePreference = config.device.parse()?;
        let device = select_device(&preference)?;

        Ok(Self {
            checkpoint_path: PathBuf::from(&config.checkpoint_path),
            device,
        })
    }

    /// Create a loader with an explicit checkpoint path and device.
    pub fn new(checkpoint_path: impl Into<PathBuf>, device: Device) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            device,
        }
    }

    /// Get the resolved compute device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Construct the network and load the checkpoint weights into it.
    ///
    /// Fails when the file is missing, unreadable, lacks a
    /// `model_state_dict` entry, or its tensors do not match the declared
    /// architecture. No partial weight loading happens in any of these
    /// cases.
    pub fn load(&self) -> Result<CxrClassifier, ModelError> {
        if !self.checkpoint_path.exists() {
            return Err(ModelError::CheckpointNotFound(self.checkpoint_path.clone()));
        }

        info!(
            path = %self.checkpoint_path.display(),
            device = ?self.device,
            "Loading checkpoint"
        );

        let state = self.read_state_dict()?;
        debug!(tensors = state.len(), "State dict read");

        let vb = VarBuilder::from_tensors(state, DType::F32, &self.device);
        let model = CxrClassifier::new(vb, self.device.clone())?;
        info!("Model ready for inference");

        Ok(model)
    }

    /// Read the `model_state_dict` tensors, dispatching on file extension.
    fn read_state_dict(&self) -> Result<HashMap<String, Tensor>, ModelError> {
        let extension = self
            .checkpoint_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match extension {
            "safetensors" => self.read_safetensors(),
            "pt" | "pth" => self.read_pickle(),
            other => Err(ModelError::Checkpoint(format!(
                "unsupported checkpoint extension `{other}`"
            ))),
        }
    }

    /// Safetensors checkpoint: weights carry the `model_state_dict.` name
    /// prefix; `epoch` and `val_acc` ride in the metadata header.
    fn read_safetensors(&self) -> Result<HashMap<String, Tensor>, ModelError> {
        let raw = std::fs::read(&self.checkpoint_path)?;
        self.log_checkpoint_metadata(&raw);

        let tensors = candle_core::safetensors::load_buffer(&raw, &self.device)
            .map_err(|e| ModelError::Checkpoint(e.to_string()))?;

        let prefix = format!("{STATE_DICT_KEY}.");
        let state: HashMap<String, Tensor> = tensors
            .into_iter()
            .filter_map(|(name, tensor)| {
                name.strip_prefix(&prefix)
                    .map(|stripped| (stripped.to_string(), tensor))
            })
            .collect();

        if state.is_empty() {
            return Err(ModelError::MissingStateDict(self.checkpoint_path.clone()));
        }
        Ok(state)
    }

    /// PyTorch pickle checkpoint: read the `model_state_dict` entry
    /// directly. Non-tensor keys are invisible to the tensor reader.
    fn read_pickle(&self) -> Result<HashMap<String, Tensor>, ModelError> {
        debug!("Pickle checkpoint: informational keys unavailable");

        let tensors =
            candle_core::pickle::read_all_with_key(&self.checkpoint_path, Some(STATE_DICT_KEY))
                .map_err(|e| ModelError::Checkpoint(e.to_string()))?;

        let prefix = format!("{STATE_DICT_KEY}.");
        let state: HashMap<String, Tensor> = tensors
            .into_iter()
            .map(|(name, tensor)| {
                let name = name
                    .strip_prefix(&prefix)
                    .map(str::to_string)
                    .unwrap_or(name);
                (name, tensor)
            })
            .collect();

        if state.is_empty() {
            return Err(ModelError::MissingStateDict(self.checkpoint_path.clone()));
        }
        Ok(state)
    }

    /// Log the informational checkpoint keys. Never used for control flow.
    fn log_checkpoint_metadata(&self, raw: &[u8]) {
        match SafeTensors::read_metadata(raw) {
            Ok((_, header)) => {
                if let Some(extra) = header.metadata() {
                    let epoch = extra.get("epoch").map(String::as_str).unwrap_or("unknown");
                    let val_acc = extra.get("val_acc").map(String::as_str).unwrap_or("unknown");
                    info!(epoch, val_acc, "Checkpoint metadata");
                }
            }
            Err(e) => warn!(error = %e, "Could not read checkpoint header"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cxr-triage-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_device_preference_parsing() {
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!("cpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("cuda".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda(0));
        assert_eq!(
            "cuda:1".parse::<DevicePreference>().unwrap(),
            DevicePreference::Cuda(1)
        );
        assert_eq!(
            "Metal".parse::<DevicePreference>().unwrap(),
            DevicePreference::Metal(0)
        );
        assert!("tpu".parse::<DevicePreference>().is_err());
        assert!("cuda:x".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_device_preference_display() {
        assert_eq!(DevicePreference::Cuda(1).to_string(), "cuda:1");
        assert_eq!(DevicePreference::Cpu.to_string(), "cpu");
    }

    #[test]
    fn test_missing_checkpoint_is_fatal() {
        let loader = ModelLoader::new("does/not/exist.safetensors", Device::Cpu);
        let result = loader.load();
        assert!(matches!(result, Err(ModelError::CheckpointNotFound(_))));
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let path = temp_path("ckpt.bin");
        std::fs::write(&path, b"junk").unwrap();

        let loader = ModelLoader::new(&path, Device::Cpu);
        let result = loader.load();
        assert!(matches!(result, Err(ModelError::Checkpoint(_))));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_checkpoint_without_state_dict_is_rejected() {
        let path = temp_path("no-state-dict.safetensors");
        let mut tensors = HashMap::new();
        tensors.insert(
            "conv1.weight".to_string(),
            Tensor::zeros((64, 3, 7, 7), DType::F32, &Device::Cpu).unwrap(),
        );
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let loader = ModelLoader::new(&path, Device::Cpu);
        let result = loader.load();
        assert!(matches!(result, Err(ModelError::MissingStateDict(_))));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_shape_mismatch_fails_initialization() {
        // Right key, wrong tensor shape for the declared architecture
        let path = temp_path("bad-shapes.safetensors");
        let mut tensors = HashMap::new();
        tensors.insert(
            "model_state_dict.conv1.weight".to_string(),
            Tensor::zeros((8, 1, 3, 3), DType::F32, &Device::Cpu).unwrap(),
        );
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let loader = ModelLoader::new(&path, Device::Cpu);
        let result = loader.load();
        assert!(result.is_err());

        std::fs::remove_file(&path).ok();
    }
}
