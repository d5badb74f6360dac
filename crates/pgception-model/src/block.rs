//! Channel adapter in front of each PGception layer.

use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{batch_norm, linear_b, BatchNorm, Dropout, Linear, VarBuilder};
use pgception_core::{Branch, Keypoint};

use crate::adjacency::BranchAdjacency;
use crate::layer::{BranchOptions, PGceptionLayer};

/// Configuration for one block
#[derive(Debug, Clone)]
pub struct BlockConfig {
    pub in_channels: usize,
    /// Width of the projection feeding the branches
    pub mid_channels: usize,
    pub out_channels: [usize; Branch::COUNT],
    pub branches: Vec<Branch>,
    pub options: BranchOptions,
}

/// Linear → [BatchNorm] → ReLU → [Dropout] → PGception layer
pub struct Block {
    linear: Linear,
    batch_norm: Option<BatchNorm>,
    dropout: Option<Dropout>,
    pgception: PGceptionLayer,
    in_channels: usize,
}

impl Block {
    pub fn new(
        config: &BlockConfig,
        adjacency: &BranchAdjacency,
        vb: VarBuilder,
    ) -> Result<Self> {
        let linear = linear_b(
            config.in_channels,
            config.mid_channels,
            config.options.bias,
            vb.pp("linear"),
        )?;

        let batch_norm = if config.options.batch_norm {
            Some(batch_norm(Keypoint::COUNT, 1e-5, vb.pp("bn"))?)
        } else {
            None
        };

        let dropout = config.options.dropout.map(Dropout::new);

        let pgception = PGceptionLayer::new(
            adjacency,
            config.mid_channels,
            &config.out_channels,
            &config.branches,
            config.options,
            vb.pp("pgception"),
        )?;

        Ok(Self {
            linear,
            batch_norm,
            dropout,
            pgception,
            in_channels: config.in_channels,
        })
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Joint features [batch, joints, in_channels]
    ///
    /// # Returns
    /// Concatenated branch features [batch, joints, out_channels]
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let mut x = self.linear.forward(x)?;
        if let Some(bn) = &self.batch_norm {
            x = bn.forward_t(&x, train)?;
        }
        x = x.relu()?;
        if let Some(dropout) = &self.dropout {
            x = dropout.forward_t(&x, train)?;
        }
        self.pgception.forward_t(&x, train)
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.pgception.out_channels()
    }

    pub fn layer(&self) -> &PGceptionLayer {
        &self.pgception
    }
}
