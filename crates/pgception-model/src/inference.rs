//! Inference wrapper turning keypoint sets into action probabilities.

use std::path::Path;

use candle_core::{DType, Device, Result};
use candle_nn::{ops, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};

use pgception_core::KeypointSet;

use crate::checkpoint::load_checkpoint_strict;
use crate::model::{keypoints_to_tensor, PGception, PGceptionConfig};

/// Inference engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Model configuration
    pub model: PGceptionConfig,
    /// Device to run inference on
    pub device: DeviceType,
    /// Minimum probability for an action to count as active
    pub score_threshold: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Cpu,
    Cuda(usize),
    Metal,
}

impl DeviceType {
    pub fn device(self) -> Result<Device> {
        match self {
            DeviceType::Cpu => Ok(Device::Cpu),
            DeviceType::Cuda(ordinal) => Device::new_cuda(ordinal),
            DeviceType::Metal => Device::new_metal(0),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model: PGceptionConfig::default(),
            device: DeviceType::Cpu,
            score_threshold: 0.5,
        }
    }
}

/// Per-action probabilities for one pose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionScores {
    pub scores: Vec<f32>,
}

impl ActionScores {
    /// Actions at or above `threshold`, highest score first
    pub fn active(&self, threshold: f32) -> Vec<(usize, f32)> {
        let mut active: Vec<(usize, f32)> = self
            .scores
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, s)| *s >= threshold)
            .collect();
        active.sort_by(|a, b| b.1.total_cmp(&a.1));
        active
    }

    /// Highest-scoring action
    pub fn top(&self) -> Option<(usize, f32)> {
        self.scores
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Pose-to-action classifier in evaluation mode
pub struct ActionClassifier {
    model: PGception,
    varmap: VarMap,
    device: Device,
    config: InferenceConfig,
}

impl ActionClassifier {
    /// Create a classifier with freshly initialised weights (for testing)
    pub fn new_random(config: InferenceConfig) -> Result<Self> {
        let device = config.device.device()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let model = PGception::new(config.model.clone(), vb)?;

        Ok(Self {
            model,
            varmap,
            device,
            config,
        })
    }

    /// Load a classifier from a safetensors checkpoint, requiring an exact
    /// parameter match
    pub fn load<P: AsRef<Path>>(path: P, config: InferenceConfig) -> Result<Self> {
        let classifier = Self::new_random(config)?;
        load_checkpoint_strict(&classifier.varmap, path.as_ref())
            .map_err(candle_core::Error::wrap)?;
        Ok(classifier)
    }

    /// Score a batch of poses
    pub fn predict(&self, poses: &[KeypointSet]) -> Result<Vec<ActionScores>> {
        if poses.is_empty() {
            return Ok(Vec::new());
        }

        let input = keypoints_to_tensor(poses, &self.device)?;
        let logits = self.model.forward_t(&input, false)?;
        let probabilities = ops::sigmoid(&logits)?;

        Ok(probabilities
            .to_vec2::<f32>()?
            .into_iter()
            .map(|scores| ActionScores { scores })
            .collect())
    }

    /// Active actions for each pose, using the configured threshold
    pub fn detect(&self, poses: &[KeypointSet]) -> Result<Vec<Vec<(usize, f32)>>> {
        Ok(self
            .predict(poses)?
            .iter()
            .map(|s| s.active(self.config.score_threshold))
            .collect())
    }

    pub fn model(&self) -> &PGception {
        &self.model
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }
}
