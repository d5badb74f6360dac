//! Fundamental pose types shared across the PGception crates.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// COCO 17-keypoint skeleton
///
/// The discriminant is the joint's row/column in every adjacency matrix and
/// its slot in every per-joint batch-norm layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Keypoint {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl Keypoint {
    pub const COUNT: usize = 17;

    pub const ALL: [Keypoint; Self::COUNT] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    pub fn from_index(idx: u8) -> Option<Self> {
        Self::ALL.get(idx as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }
}

/// One pose: a 2D coordinate per joint, in [`Keypoint`] order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeypointSet {
    pub coords: [[f32; 2]; Keypoint::COUNT],
}

impl KeypointSet {
    /// Number of coordinates per joint
    pub const CHANNELS: usize = 2;

    pub fn new(coords: [[f32; 2]; Keypoint::COUNT]) -> Self {
        Self { coords }
    }

    pub fn zeros() -> Self {
        Self::new([[0.0; 2]; Keypoint::COUNT])
    }

    /// Build from a flat `[x0, y0, x1, y1, ...]` slice of 34 values
    pub fn from_flat(values: &[f32]) -> Result<Self> {
        let expected = Keypoint::COUNT * Self::CHANNELS;
        if values.len() != expected {
            return Err(Error::InvalidInput(format!(
                "expected {expected} keypoint values, got {}",
                values.len()
            )));
        }

        let mut coords = [[0.0f32; 2]; Keypoint::COUNT];
        for (joint, pair) in values.chunks_exact(Self::CHANNELS).enumerate() {
            coords[joint] = [pair[0], pair[1]];
        }
        Ok(Self { coords })
    }

    /// Flatten to `[x0, y0, x1, y1, ...]`
    pub fn to_flat(&self) -> Vec<f32> {
        self.coords.iter().flatten().copied().collect()
    }

    pub fn get(&self, keypoint: Keypoint) -> [f32; 2] {
        self.coords[keypoint.index()]
    }

    pub fn is_finite(&self) -> bool {
        self.coords.iter().flatten().all(|v| v.is_finite())
    }
}

impl Default for KeypointSet {
    fn default() -> Self {
        Self::zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypoint_index_roundtrip() {
        for (i, kp) in Keypoint::ALL.iter().enumerate() {
            assert_eq!(kp.index(), i);
            assert_eq!(Keypoint::from_index(i as u8), Some(*kp));
        }
        assert_eq!(Keypoint::from_index(17), None);
    }

    #[test]
    fn test_keypoint_set_flat() {
        let values: Vec<f32> = (0..34).map(|v| v as f32).collect();
        let set = KeypointSet::from_flat(&values).unwrap();

        assert_eq!(set.get(Keypoint::Nose), [0.0, 1.0]);
        assert_eq!(set.get(Keypoint::RightAnkle), [32.0, 33.0]);
        assert_eq!(set.to_flat(), values);
    }

    #[test]
    fn test_keypoint_set_rejects_wrong_length() {
        assert!(matches!(
            KeypointSet::from_flat(&[0.0; 10]),
            Err(Error::InvalidInput(_))
        ));
    }
}
