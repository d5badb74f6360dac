//! Classification heads mapping joint features to action logits.
//!
//! Two mutually exclusive heads are available:
//! 1. Mean: average over joints, then an MLP
//! 2. Cat: per-joint projection to 64 channels, flatten joints, then an MLP
//!
//! Both emit raw multi-label logits; no softmax or sigmoid is applied.

use std::fmt;
use std::str::FromStr;

use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{batch_norm, linear, linear_b, BatchNorm, Dropout, Linear, VarBuilder};
use pgception_core::{Error, Keypoint};
use serde::{Deserialize, Serialize};

/// Per-joint width of the "cat" head projection
pub const CAT_PROJECTION_CHANNELS: usize = 64;

/// Which classification head the model uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierMode {
    /// Project joints, flatten, classify
    #[default]
    Cat,
    /// Average joints, classify
    Mean,
}

impl ClassifierMode {
    pub fn name(self) -> &'static str {
        match self {
            ClassifierMode::Cat => "cat",
            ClassifierMode::Mean => "mean",
        }
    }
}

impl fmt::Display for ClassifierMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClassifierMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cat" => Ok(ClassifierMode::Cat),
            "mean" => Ok(ClassifierMode::Mean),
            other => Err(Error::InvalidConfig(format!(
                "unknown classifier mode '{other}', expected 'cat' or 'mean'"
            ))),
        }
    }
}

/// Configuration for the classification head
#[derive(Debug, Clone)]
pub struct HeadConfig {
    pub mode: ClassifierMode,
    /// Joint feature width coming out of the last block
    pub in_channels: usize,
    /// Hidden width of the MLP
    pub hidden_channels: usize,
    pub action_num: usize,
    pub bias: bool,
    pub dropout: Option<f32>,
    /// Batch norm on the cat projection; the MLP always normalizes
    pub batch_norm: bool,
}

/// Linear → BatchNorm → ReLU → [Dropout] → Linear
pub struct Mlp {
    hidden: Linear,
    bn: BatchNorm,
    dropout: Option<Dropout>,
    output: Linear,
}

impl Mlp {
    fn new(in_dim: usize, config: &HeadConfig, vb: VarBuilder) -> Result<Self> {
        let hidden = linear_b(in_dim, config.hidden_channels, config.bias, vb.pp("hidden"))?;
        let bn = batch_norm(config.hidden_channels, 1e-5, vb.pp("bn"))?;
        let output = linear_b(
            config.hidden_channels,
            config.action_num,
            config.bias,
            vb.pp("output"),
        )?;

        Ok(Self {
            hidden,
            bn,
            dropout: config.dropout.map(Dropout::new),
            output,
        })
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let x = self.hidden.forward(x)?;
        let x = self.bn.forward_t(&x, train)?;
        let mut x = x.relu()?;
        if let Some(dropout) = &self.dropout {
            x = dropout.forward_t(&x, train)?;
        }
        self.output.forward(&x)
    }
}

/// Per-joint Linear(→64) → [BatchNorm] → ReLU → [Dropout]
pub struct JointProjection {
    linear: Linear,
    bn: Option<BatchNorm>,
    dropout: Option<Dropout>,
}

impl JointProjection {
    fn new(config: &HeadConfig, vb: VarBuilder) -> Result<Self> {
        let linear = linear(config.in_channels, CAT_PROJECTION_CHANNELS, vb.pp("linear"))?;
        let bn = if config.batch_norm {
            Some(batch_norm(Keypoint::COUNT, 1e-5, vb.pp("bn"))?)
        } else {
            None
        };

        Ok(Self {
            linear,
            bn,
            dropout: config.dropout.map(Dropout::new),
        })
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let mut x = self.linear.forward(x)?;
        if let Some(bn) = &self.bn {
            x = bn.forward_t(&x, train)?;
        }
        x = x.relu()?;
        if let Some(dropout) = &self.dropout {
            x = dropout.forward_t(&x, train)?;
        }
        Ok(x)
    }
}

/// Classification head, resolved once at construction
pub enum ClassifierHead {
    Mean {
        mlp: Mlp,
    },
    Cat {
        projection: JointProjection,
        mlp: Mlp,
    },
}

impl ClassifierHead {
    pub fn new(config: &HeadConfig, vb: VarBuilder) -> Result<Self> {
        match config.mode {
            ClassifierMode::Mean => {
                let mlp = Mlp::new(config.in_channels, config, vb.pp("classifier"))?;
                Ok(ClassifierHead::Mean { mlp })
            }
            ClassifierMode::Cat => {
                let projection = JointProjection::new(config, vb.pp("projection"))?;
                let mlp = Mlp::new(
                    CAT_PROJECTION_CHANNELS * Keypoint::COUNT,
                    config,
                    vb.pp("classifier"),
                )?;
                Ok(ClassifierHead::Cat { projection, mlp })
            }
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Joint features [batch, joints, in_channels]
    ///
    /// # Returns
    /// Action logits [batch, action_num]
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        match self {
            ClassifierHead::Mean { mlp } => {
                let pooled = x.mean(1)?;
                mlp.forward_t(&pooled, train)
            }
            ClassifierHead::Cat { projection, mlp } => {
                let projected = projection.forward_t(x, train)?;
                let flat = projected.flatten_from(1)?;
                mlp.forward_t(&flat, train)
            }
        }
    }

    pub fn mode(&self) -> ClassifierMode {
        match self {
            ClassifierHead::Mean { .. } => ClassifierMode::Mean,
            ClassifierHead::Cat { .. } => ClassifierMode::Cat,
        }
    }
}
