//! Complete PGception action recognition model.

use candle_core::{ModuleT, Result, Tensor};
use candle_nn::VarBuilder;
use pgception_core::{Branch, Error, Keypoint, KeypointSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adjacency::BranchAdjacency;
use crate::block::{Block, BlockConfig};
use crate::heads::{ClassifierHead, ClassifierMode, HeadConfig};
use crate::init::WeightInit;
use crate::layer::{concat_width, normalize_branches, BranchOptions};

/// Width of the projection at the front of every block
pub const BLOCK_MID_CHANNELS: usize = 128;

/// Complete model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PGceptionConfig {
    /// Number of action classes
    pub action_num: usize,
    /// Number of stacked blocks (1 or 2)
    pub layers: usize,
    #[serde(alias = "classifier_mod")]
    pub classifier_mode: ClassifierMode,
    /// Output width of each branch, indexed by branch
    #[serde(alias = "o_c_l")]
    pub out_channel_list: [usize; Branch::COUNT],
    /// Enabled branches
    pub branches: Vec<Branch>,
    /// Hidden width of the classifier MLP
    #[serde(alias = "last_h_c")]
    pub last_hidden_channels: usize,
    pub bias: bool,
    /// Dropout probability; `None` or zero disables dropout layers
    #[serde(alias = "drop")]
    pub dropout: Option<f32>,
    #[serde(alias = "bn")]
    pub batch_norm: bool,
    pub agg_first: bool,
    #[serde(alias = "attn")]
    pub attention: bool,
    pub init: WeightInit,
}

impl Default for PGceptionConfig {
    fn default() -> Self {
        Self {
            action_num: 24,
            layers: 1,
            classifier_mode: ClassifierMode::Cat,
            out_channel_list: [64, 64, 128, 128],
            branches: Branch::ALL.to_vec(),
            last_hidden_channels: 256,
            bias: true,
            dropout: None,
            batch_norm: false,
            agg_first: true,
            attention: false,
            init: WeightInit::KaimingUniform,
        }
    }
}

impl PGceptionConfig {
    /// Check every option before any parameter is created
    pub fn validate(&self) -> pgception_core::Result<()> {
        if self.action_num == 0 {
            return Err(Error::InvalidConfig("action_num must be > 0".into()));
        }
        if !(1..=2).contains(&self.layers) {
            return Err(Error::InvalidConfig(format!(
                "layers must be 1 or 2, got {}",
                self.layers
            )));
        }
        let branches = normalize_branches(&self.branches)?;
        if let Some(branch) = branches
            .iter()
            .find(|b| self.out_channel_list[b.index()] == 0)
        {
            return Err(Error::InvalidConfig(format!(
                "branch '{branch}' is enabled with zero output channels"
            )));
        }
        if self.last_hidden_channels == 0 {
            return Err(Error::InvalidConfig(
                "last_hidden_channels must be > 0".into(),
            ));
        }
        if let Some(p) = self.dropout {
            if !(0.0..1.0).contains(&p) {
                return Err(Error::InvalidConfig(format!(
                    "dropout must be in [0, 1), got {p}"
                )));
            }
        }
        Ok(())
    }

    /// Dropout that actually produces a layer
    pub fn effective_dropout(&self) -> Option<f32> {
        self.dropout.filter(|p| *p > 0.0)
    }

    /// Width of every block's concatenated output
    pub fn block_out_channels(&self) -> usize {
        let branches = normalize_branches(&self.branches).unwrap_or_default();
        concat_width(&self.out_channel_list, &branches)
    }

    pub fn branch_options(&self) -> BranchOptions {
        BranchOptions {
            bias: self.bias,
            dropout: self.effective_dropout(),
            batch_norm: self.batch_norm,
            agg_first: self.agg_first,
            attention: self.attention,
            init: self.init,
        }
    }
}

/// PGception: stacked multi-branch graph convolution blocks and a
/// multi-label classification head
pub struct PGception {
    adjacency: BranchAdjacency,
    blocks: Vec<Block>,
    head: ClassifierHead,
    config: PGceptionConfig,
}

impl PGception {
    pub fn new(config: PGceptionConfig, vb: VarBuilder) -> Result<Self> {
        config.validate().map_err(candle_core::Error::wrap)?;

        let adjacency = BranchAdjacency::new(vb.device())?;
        let options = config.branch_options();

        let block_width = config.block_out_channels();
        let mut blocks: Vec<Block> = Vec::with_capacity(config.layers);
        let mut in_channels = KeypointSet::CHANNELS;
        for i in 0..config.layers {
            let block_config = BlockConfig {
                in_channels,
                mid_channels: BLOCK_MID_CHANNELS,
                out_channels: config.out_channel_list,
                branches: config.branches.clone(),
                options,
            };
            let block = Block::new(&block_config, &adjacency, vb.pp(format!("block{}", i + 1)))?;

            // Every block must emit the width the next stage and the head are sized for
            if block.out_channels() != block_width {
                return Err(candle_core::Error::wrap(Error::ChannelMismatch {
                    expected: block_width,
                    actual: block.out_channels(),
                }));
            }

            in_channels = block.out_channels();
            blocks.push(block);
        }

        let head = ClassifierHead::new(
            &HeadConfig {
                mode: config.classifier_mode,
                in_channels,
                hidden_channels: config.last_hidden_channels,
                action_num: config.action_num,
                bias: config.bias,
                dropout: config.effective_dropout(),
                batch_norm: config.batch_norm,
            },
            vb.clone(),
        )?;

        debug!(
            layers = config.layers,
            classifier = %config.classifier_mode,
            block_width = in_channels,
            actions = config.action_num,
            "built PGception model"
        );

        Ok(Self {
            adjacency,
            blocks,
            head,
            config,
        })
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Keypoint coordinates [batch, 17, 2]
    /// * `train` - Use batch statistics and active dropout
    ///
    /// # Returns
    /// Raw action logits [batch, action_num]
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let (_batch, joints, channels) = x.dims3()?;
        if joints != Keypoint::COUNT || channels != KeypointSet::CHANNELS {
            return Err(candle_core::Error::wrap(Error::InvalidInput(format!(
                "expected input [batch, {}, {}], got {:?}",
                Keypoint::COUNT,
                KeypointSet::CHANNELS,
                x.dims()
            ))));
        }

        let mut x = x.clone();
        for block in &self.blocks {
            x = block.forward_t(&x, train)?;
        }
        self.head.forward_t(&x, train)
    }

    /// `(in, out)` channel widths of each block
    pub fn stage_widths(&self) -> Vec<(usize, usize)> {
        self.blocks
            .iter()
            .map(|b| (b.in_channels(), b.out_channels()))
            .collect()
    }

    pub fn adjacency(&self) -> &BranchAdjacency {
        &self.adjacency
    }

    pub fn head(&self) -> &ClassifierHead {
        &self.head
    }

    pub fn config(&self) -> &PGceptionConfig {
        &self.config
    }
}

impl ModuleT for PGception {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        PGception::forward_t(self, xs, train)
    }
}

/// Stack keypoint sets into a `[batch, 17, 2]` tensor
pub fn keypoints_to_tensor(sets: &[KeypointSet], device: &candle_core::Device) -> Result<Tensor> {
    let data: Vec<f32> = sets.iter().flat_map(|s| s.to_flat()).collect();
    Tensor::from_vec(data, (sets.len(), Keypoint::COUNT, KeypointSet::CHANNELS), device)
}
