//! PGception layer: parallel graph convolutions over the four skeleton graphs.

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;
use pgception_core::{Branch, Error};

use crate::adjacency::BranchAdjacency;
use crate::gcn::{GraphConv, GraphConvConfig};
use crate::init::WeightInit;

/// Options shared by every graph convolution of a layer
#[derive(Debug, Clone, Copy)]
pub struct BranchOptions {
    pub bias: bool,
    pub dropout: Option<f32>,
    pub batch_norm: bool,
    pub agg_first: bool,
    /// Ignored on the identity branch
    pub attention: bool,
    pub init: WeightInit,
}

impl Default for BranchOptions {
    fn default() -> Self {
        Self {
            bias: true,
            dropout: None,
            batch_norm: false,
            agg_first: true,
            attention: false,
            init: WeightInit::default(),
        }
    }
}

/// Sorted, deduplicated branch set. Empty sets are rejected.
pub fn normalize_branches(branches: &[Branch]) -> std::result::Result<Vec<Branch>, Error> {
    let mut branches = branches.to_vec();
    branches.sort();
    branches.dedup();
    if branches.is_empty() {
        return Err(Error::InvalidConfig(
            "a PGception layer needs at least one branch".to_string(),
        ));
    }
    Ok(branches)
}

/// Sum of the output widths of the enabled branches
pub fn concat_width(out_channels: &[usize; Branch::COUNT], branches: &[Branch]) -> usize {
    branches.iter().map(|b| out_channels[b.index()]).sum()
}

/// Runs one graph convolution per enabled branch on the same input and
/// concatenates the results along the channel axis in branch order.
pub struct PGceptionLayer {
    branches: Vec<(Branch, GraphConv)>,
    in_channels: usize,
    out_channels: usize,
}

impl PGceptionLayer {
    /// # Arguments
    /// * `out_channels` - Output width per branch index; entries of disabled
    ///   branches are ignored
    /// * `branches` - Enabled branches, in any order
    pub fn new(
        adjacency: &BranchAdjacency,
        in_channels: usize,
        out_channels: &[usize; Branch::COUNT],
        branches: &[Branch],
        options: BranchOptions,
        vb: VarBuilder,
    ) -> Result<Self> {
        let enabled = normalize_branches(branches).map_err(candle_core::Error::wrap)?;

        let mut convs = Vec::with_capacity(enabled.len());
        for branch in enabled {
            let width = out_channels[branch.index()];
            if width == 0 {
                return Err(candle_core::Error::wrap(Error::InvalidConfig(format!(
                    "branch '{branch}' has zero output channels"
                ))));
            }

            let config = GraphConvConfig {
                in_channels,
                out_channels: width,
                bias: options.bias,
                dropout: options.dropout,
                batch_norm: options.batch_norm,
                agg_first: options.agg_first,
                attention: options.attention && branch.supports_attention(),
                init: options.init,
            };
            let conv = GraphConv::new(adjacency.get(branch), config, vb.pp(branch.name()))?;
            convs.push((branch, conv));
        }

        let out_width = convs.iter().map(|(_, conv)| conv.out_channels()).sum();

        Ok(Self {
            branches: convs,
            in_channels,
            out_channels: out_width,
        })
    }

    /// Per-branch outputs, in ascending branch order
    pub fn forward_branches(&self, x: &Tensor, train: bool) -> Result<Vec<(Branch, Tensor)>> {
        self.branches
            .iter()
            .map(|(branch, conv)| Ok((*branch, conv.forward_t(x, train)?)))
            .collect()
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Joint features [batch, joints, in_channels]
    ///
    /// # Returns
    /// Concatenated branch features [batch, joints, out_channels]
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let outputs: Vec<Tensor> = self
            .forward_branches(x, train)?
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        Tensor::cat(&outputs, 2)
    }

    pub fn branches(&self) -> impl Iterator<Item = Branch> + '_ {
        self.branches.iter().map(|(b, _)| *b)
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Concatenated output width
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}
