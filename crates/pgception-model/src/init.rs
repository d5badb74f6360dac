//! Weight initialisation schemes for graph-convolution linear layers.

use std::fmt;
use std::str::FromStr;

use candle_core::Result;
use candle_nn::{Init, Linear, VarBuilder};
use pgception_core::Error;
use serde::{Deserialize, Serialize};

/// Initialisation applied to a graph convolution's weight matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightInit {
    /// candle's stock linear initialisation
    Default,
    /// U(-b, b) with b = sqrt(6 / fan_in)
    #[default]
    KaimingUniform,
    /// U(-b, b) with b = sqrt(6 / (fan_in + fan_out))
    XavierUniform,
}

impl WeightInit {
    pub fn name(self) -> &'static str {
        match self {
            WeightInit::Default => "default",
            WeightInit::KaimingUniform => "kaiming_uniform",
            WeightInit::XavierUniform => "xavier_uniform",
        }
    }

    /// Half-width of the uniform weight distribution, if this scheme is uniform
    pub fn uniform_bound(self, fan_in: usize, fan_out: usize) -> Option<f64> {
        match self {
            WeightInit::Default => None,
            WeightInit::KaimingUniform => Some((6.0 / fan_in as f64).sqrt()),
            WeightInit::XavierUniform => Some((6.0 / (fan_in + fan_out) as f64).sqrt()),
        }
    }
}

impl fmt::Display for WeightInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WeightInit {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(WeightInit::Default),
            "kaiming_uniform" => Ok(WeightInit::KaimingUniform),
            "xavier_uniform" => Ok(WeightInit::XavierUniform),
            other => Err(Error::InvalidConfig(format!(
                "unknown init scheme '{other}', expected default, kaiming_uniform or xavier_uniform"
            ))),
        }
    }
}

/// Linear layer whose weight follows `init`; biases of uniform schemes start at zero
pub fn linear_with_init(
    in_dim: usize,
    out_dim: usize,
    bias: bool,
    init: WeightInit,
    vb: VarBuilder,
) -> Result<Linear> {
    let Some(bound) = init.uniform_bound(in_dim, out_dim) else {
        return candle_nn::linear_b(in_dim, out_dim, bias, vb);
    };

    let weight = vb.get_with_hints(
        (out_dim, in_dim),
        "weight",
        Init::Uniform {
            lo: -bound,
            up: bound,
        },
    )?;
    let bias = if bias {
        Some(vb.get_with_hints(out_dim, "bias", Init::Const(0.0))?)
    } else {
        None
    };

    Ok(Linear::new(weight, bias))
}
