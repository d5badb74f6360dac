//! Pose datasets and mini-batch loading.
//!
//! A sample is one [`KeypointSet`] with a multi-hot label vector covering
//! every action. Datasets come from a JSON split file or from the
//! deterministic [`SyntheticPoseDataset`] used for dry runs.

use std::path::Path;

use candle_core::{Device, Tensor};
use pgception_core::{Keypoint, KeypointSet};
use pgception_model::keypoints_to_tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{TrainError, TrainResult};

/// One labelled pose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub keypoints: KeypointSet,
    /// Multi-hot action labels in `{0, 1}`
    pub labels: Vec<f32>,
}

pub trait PoseDataset: Send + Sync {
    fn len(&self) -> usize;

    /// Sample at `idx`; [`TrainError::IndexOutOfBounds`] past the end
    fn get(&self, idx: usize) -> TrainResult<PoseSample>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name used in log output
    fn name(&self) -> &str;
}

/// Dataset held entirely in memory
#[derive(Debug, Clone)]
pub struct InMemoryPoseDataset {
    name: String,
    samples: Vec<PoseSample>,
}

impl InMemoryPoseDataset {
    pub fn new(name: impl Into<String>, samples: Vec<PoseSample>) -> Self {
        Self {
            name: name.into(),
            samples,
        }
    }

    pub fn samples(&self) -> &[PoseSample] {
        &self.samples
    }
}

impl PoseDataset for InMemoryPoseDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, idx: usize) -> TrainResult<PoseSample> {
        self.samples
            .get(idx)
            .cloned()
            .ok_or(TrainError::IndexOutOfBounds {
                index: idx,
                len: self.samples.len(),
            })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// On-disk layout of a dataset file: `{"train": [...], "val": [...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseSplits {
    pub train: Vec<PoseSample>,
    #[serde(default)]
    pub val: Vec<PoseSample>,
}

impl PoseSplits {
    /// Read a split file and check every sample against `action_num`
    pub fn from_file(path: &Path, action_num: usize) -> TrainResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            pgception_core::Error::Dataset(format!("{}: {e}", path.display()))
        })?;
        let splits: PoseSplits = serde_json::from_str(&raw)?;
        splits.check(action_num)?;
        Ok(splits)
    }

    pub fn check(&self, action_num: usize) -> TrainResult<()> {
        for (index, sample) in self.train.iter().chain(self.val.iter()).enumerate() {
            check_sample(index, sample, action_num)?;
        }
        Ok(())
    }

    pub fn into_datasets(self) -> (InMemoryPoseDataset, InMemoryPoseDataset) {
        (
            InMemoryPoseDataset::new("train", self.train),
            InMemoryPoseDataset::new("val", self.val),
        )
    }
}

fn check_sample(index: usize, sample: &PoseSample, action_num: usize) -> TrainResult<()> {
    if sample.labels.len() != action_num {
        return Err(TrainError::LabelWidth {
            index,
            expected: action_num,
            actual: sample.labels.len(),
        });
    }
    if !sample.keypoints.is_finite() {
        return Err(pgception_core::Error::Dataset(format!(
            "sample {index} has non-finite keypoints"
        ))
        .into());
    }
    Ok(())
}

/// Deterministic synthetic poses for pipeline smoke tests.
///
/// Each sample gets one action; the pose is a fixed skeleton template shifted
/// by an action-dependent offset plus small noise, so the labels are
/// learnable.
#[derive(Debug, Clone)]
pub struct SyntheticPoseDataset {
    num_samples: usize,
    action_num: usize,
    seed: u64,
}

impl SyntheticPoseDataset {
    pub fn new(num_samples: usize, action_num: usize, seed: u64) -> Self {
        Self {
            num_samples,
            action_num,
            seed,
        }
    }

    /// Action assigned to sample `idx`
    pub fn action_of(&self, idx: usize) -> usize {
        idx % self.action_num.max(1)
    }
}

impl PoseDataset for SyntheticPoseDataset {
    fn len(&self) -> usize {
        self.num_samples
    }

    fn get(&self, idx: usize) -> TrainResult<PoseSample> {
        if idx >= self.num_samples {
            return Err(TrainError::IndexOutOfBounds {
                index: idx,
                len: self.num_samples,
            });
        }

        let action = self.action_of(idx);
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(idx as u64));
        let angle = action as f32 / self.action_num.max(1) as f32 * std::f32::consts::TAU;

        let mut coords = [[0.0f32; 2]; Keypoint::COUNT];
        for (joint, xy) in coords.iter_mut().enumerate() {
            let base_x = if joint % 2 == 1 { -0.2 } else { 0.2 };
            let base_y = joint as f32 / Keypoint::COUNT as f32 - 0.5;
            xy[0] = base_x + 0.3 * angle.cos() + rng.gen_range(-0.02..0.02);
            xy[1] = base_y + 0.3 * angle.sin() + rng.gen_range(-0.02..0.02);
        }

        let mut labels = vec![0.0; self.action_num];
        if let Some(label) = labels.get_mut(action) {
            *label = 1.0;
        }

        Ok(PoseSample {
            keypoints: KeypointSet::new(coords),
            labels,
        })
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// A collated mini-batch
pub struct Batch {
    /// Keypoints `[batch, 17, 2]`
    pub inputs: Tensor,
    /// Multi-hot labels `[batch, action_num]`
    pub labels: Tensor,
    pub len: usize,
}

/// Stack samples into input and label tensors
pub fn collate(samples: &[PoseSample], action_num: usize, device: &Device) -> TrainResult<Batch> {
    let mut labels = Vec::with_capacity(samples.len() * action_num);
    let mut keypoints = Vec::with_capacity(samples.len());
    for (index, sample) in samples.iter().enumerate() {
        check_sample(index, sample, action_num)?;
        labels.extend_from_slice(&sample.labels);
        keypoints.push(sample.keypoints);
    }

    Ok(Batch {
        inputs: keypoints_to_tensor(&keypoints, device)?,
        labels: Tensor::from_vec(labels, (samples.len(), action_num), device)?,
        len: samples.len(),
    })
}

/// Batched loader over a [`PoseDataset`].
///
/// Shuffling is reproducible: epoch `e` with seed `s` always yields the same
/// order.
pub struct DataLoader<'a> {
    dataset: &'a dyn PoseDataset,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
}

impl<'a> DataLoader<'a> {
    pub fn new(dataset: &'a dyn PoseDataset, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle,
            seed,
        }
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Sample indices grouped into batches for `epoch`
    pub fn batch_indices(&self, epoch: usize) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed ^ (epoch as u64).rotate_left(32));
            indices.shuffle(&mut rng);
        }
        indices
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Load and collate one batch of indices
    pub fn load(&self, indices: &[usize], action_num: usize, device: &Device) -> TrainResult<Batch> {
        let samples = indices
            .iter()
            .map(|&idx| self.dataset.get(idx))
            .collect::<TrainResult<Vec<_>>>()?;
        collate(&samples, action_num, device)
    }

    pub fn dataset(&self) -> &dyn PoseDataset {
        self.dataset
    }
}
