//! Graph convolution unit over a fixed joint adjacency.
//!
//! Each joint's features go through a shared linear transform, and features
//! are mixed across joints by the (optionally attention-weighted) adjacency:
//!
//! - aggregate first: `Linear(Â · X)`
//! - transform first: `Â · Linear(X)`
//!
//! followed by optional per-joint batch norm, ReLU and optional dropout.

use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{batch_norm, BatchNorm, Dropout, Init, Linear, VarBuilder};
use pgception_core::Error;

use crate::init::{linear_with_init, WeightInit};

/// Configuration for a single graph convolution unit
#[derive(Debug, Clone)]
pub struct GraphConvConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    /// Learned additive bias in the linear transform
    pub bias: bool,
    /// Dropout probability applied to the output
    pub dropout: Option<f32>,
    /// Batch norm over the joint axis
    pub batch_norm: bool,
    /// Aggregate over the graph before the linear transform
    pub agg_first: bool,
    /// Learn a per-edge reweighting of the adjacency
    pub attention: bool,
    pub init: WeightInit,
}

impl GraphConvConfig {
    pub fn new(in_channels: usize, out_channels: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            bias: true,
            dropout: None,
            batch_norm: false,
            agg_first: true,
            attention: false,
            init: WeightInit::default(),
        }
    }
}

/// Graph convolution with a constant adjacency buffer
pub struct GraphConv {
    adjacency: Tensor,
    edge_importance: Option<Tensor>,
    linear: Linear,
    batch_norm: Option<BatchNorm>,
    dropout: Option<Dropout>,
    config: GraphConvConfig,
}

impl GraphConv {
    /// `adjacency` is a `[joints, joints]` normalized matrix; it is cloned by
    /// reference and never modified.
    pub fn new(adjacency: &Tensor, config: GraphConvConfig, vb: VarBuilder) -> Result<Self> {
        let (joints, cols) = adjacency.dims2()?;
        if joints != cols {
            return Err(candle_core::Error::wrap(Error::InvalidInput(format!(
                "adjacency must be square, got {joints}x{cols}"
            ))));
        }

        let linear = linear_with_init(
            config.in_channels,
            config.out_channels,
            config.bias,
            config.init,
            vb.pp("linear"),
        )?;

        // Starts at ones so the unit initially behaves like the plain adjacency
        let edge_importance = if config.attention {
            Some(vb.get_with_hints((joints, joints), "edge_importance", Init::Const(1.0))?)
        } else {
            None
        };

        let batch_norm = if config.batch_norm {
            Some(batch_norm(joints, 1e-5, vb.pp("bn"))?)
        } else {
            None
        };

        let dropout = config.dropout.map(Dropout::new);

        Ok(Self {
            adjacency: adjacency.clone(),
            edge_importance,
            linear,
            batch_norm,
            dropout,
            config,
        })
    }

    /// Adjacency actually used for aggregation
    pub fn effective_adjacency(&self) -> Result<Tensor> {
        match &self.edge_importance {
            Some(importance) => self.adjacency.mul(importance),
            None => Ok(self.adjacency.clone()),
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Joint features [batch, joints, in_channels]
    /// * `train` - Use batch statistics and active dropout
    ///
    /// # Returns
    /// Joint features [batch, joints, out_channels]
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let (_batch, _joints, channels) = x.dims3()?;
        if channels != self.config.in_channels {
            return Err(candle_core::Error::wrap(Error::ChannelMismatch {
                expected: self.config.in_channels,
                actual: channels,
            }));
        }

        let adjacency = self.effective_adjacency()?;

        let mut x = if self.config.agg_first {
            let x = adjacency.broadcast_matmul(x)?;
            self.linear.forward(&x)?
        } else {
            let x = self.linear.forward(x)?;
            adjacency.broadcast_matmul(&x)?
        };

        if let Some(bn) = &self.batch_norm {
            x = bn.forward_t(&x, train)?;
        }
        x = x.relu()?;
        if let Some(dropout) = &self.dropout {
            x = dropout.forward_t(&x, train)?;
        }
        Ok(x)
    }

    pub fn in_channels(&self) -> usize {
        self.config.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.config.out_channels
    }

    pub fn config(&self) -> &GraphConvConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;
    use pgception_core::Branch;

    use crate::adjacency::BranchAdjacency;

    fn assert_close(a: &Tensor, b: &Tensor) -> Result<()> {
        let a: Vec<f32> = a.flatten_all()?.to_vec1()?;
        let b: Vec<f32> = b.flatten_all()?.to_vec1()?;
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-4, "{x} != {y}");
        }
        Ok(())
    }

    #[test]
    fn test_graph_conv_shapes() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let adjacency = BranchAdjacency::new(&device)?;

        let mut config = GraphConvConfig::new(8, 12);
        config.batch_norm = true;
        config.dropout = Some(0.5);

        let gcn = GraphConv::new(adjacency.get(Branch::Local), config, vb)?;
        let x = Tensor::randn(0f32, 1.0, (3, 17, 8), &device)?;

        assert_eq!(gcn.forward_t(&x, true)?.dims(), &[3, 17, 12]);
        assert_eq!(gcn.forward_t(&x, false)?.dims(), &[3, 17, 12]);
        Ok(())
    }

    #[test]
    fn test_aggregation_order_is_equivalent_without_bias() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let adjacency = BranchAdjacency::new(&device)?;

        let mut config = GraphConvConfig::new(6, 5);
        config.bias = false;
        let agg_first = GraphConv::new(adjacency.get(Branch::Extended), config.clone(), vb.pp("g"))?;

        config.agg_first = false;
        // Same prefix, so both units share the same weight
        let transform_first = GraphConv::new(adjacency.get(Branch::Extended), config, vb.pp("g"))?;

        let x = Tensor::randn(0f32, 1.0, (2, 17, 6), &device)?;
        assert_close(&agg_first.forward_t(&x, false)?, &transform_first.forward_t(&x, false)?)
    }

    #[test]
    fn test_attention_starts_at_plain_adjacency() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let adjacency = BranchAdjacency::new(&device)?;

        let mut config = GraphConvConfig::new(4, 4);
        config.attention = true;
        let gcn = GraphConv::new(adjacency.get(Branch::Dense), config, vb)?;

        assert_close(&gcn.effective_adjacency()?, adjacency.get(Branch::Dense))?;
        assert_eq!(varmap.all_vars().len(), 3); // weight, bias, edge_importance
        Ok(())
    }

    #[test]
    fn test_channel_mismatch_is_an_error() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let adjacency = BranchAdjacency::new(&device)?;

        let gcn = GraphConv::new(adjacency.get(Branch::Identity), GraphConvConfig::new(8, 4), vb)?;
        let x = Tensor::zeros((2, 17, 7), DType::F32, &device)?;

        let err = gcn.forward_t(&x, false).unwrap_err();
        assert!(err.to_string().contains("expected 8, got 7"));
        Ok(())
    }
}
