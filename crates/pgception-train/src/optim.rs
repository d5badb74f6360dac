//! Optimizers and the learning-rate schedule.

use candle_core::backprop::GradStore;
use candle_core::{Result, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};

use crate::config::{OptimizerKind, TrainingConfig};

/// Parameters for [`MomentumSgd`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamsSgd {
    pub lr: f64,
    pub momentum: f64,
}

impl Default for ParamsSgd {
    fn default() -> Self {
        Self {
            lr: 0.01,
            momentum: 0.9,
        }
    }
}

/// Stochastic gradient descent with heavy-ball momentum:
/// `v = momentum * v + g`, `p = p - lr * v`
pub struct MomentumSgd {
    vars: Vec<(Var, Tensor)>,
    params: ParamsSgd,
}

impl Optimizer for MomentumSgd {
    type Config = ParamsSgd;

    fn new(vars: Vec<Var>, params: ParamsSgd) -> Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| {
                let velocity = var.as_tensor().zeros_like()?;
                Ok((var, velocity))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { vars, params })
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        for (var, velocity) in self.vars.iter_mut() {
            if let Some(grad) = grads.get(var.as_tensor()) {
                let next = velocity.affine(self.params.momentum, 0.0)?.add(grad)?;
                var.set(&var.sub(&next.affine(self.params.lr, 0.0)?)?)?;
                *velocity = next;
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }
}

/// Optimizer selected by [`OptimizerKind`]
pub enum TrainOptimizer {
    Sgd(MomentumSgd),
    Adam(AdamW),
}

impl TrainOptimizer {
    pub fn new(vars: Vec<Var>, config: &TrainingConfig) -> Result<Self> {
        match config.optimizer {
            OptimizerKind::Sgd => Ok(TrainOptimizer::Sgd(MomentumSgd::new(
                vars,
                ParamsSgd {
                    lr: config.learning_rate,
                    momentum: config.momentum,
                },
            )?)),
            OptimizerKind::Adam => Ok(TrainOptimizer::Adam(AdamW::new(
                vars,
                ParamsAdamW {
                    lr: config.learning_rate,
                    weight_decay: 0.0,
                    ..Default::default()
                },
            )?)),
        }
    }

    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        match self {
            TrainOptimizer::Sgd(opt) => opt.backward_step(loss),
            TrainOptimizer::Adam(opt) => opt.backward_step(loss),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        match self {
            TrainOptimizer::Sgd(opt) => opt.learning_rate(),
            TrainOptimizer::Adam(opt) => opt.learning_rate(),
        }
    }

    pub fn set_learning_rate(&mut self, lr: f64) {
        match self {
            TrainOptimizer::Sgd(opt) => opt.set_learning_rate(lr),
            TrainOptimizer::Adam(opt) => opt.set_learning_rate(lr),
        }
    }
}

/// Step decay: `base_lr * gamma^(epoch / step_size)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLr {
    pub base_lr: f64,
    pub step_size: usize,
    pub gamma: f64,
}

impl StepLr {
    pub fn new(base_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            base_lr,
            step_size,
            gamma,
        }
    }

    pub fn lr_at(&self, epoch: usize) -> f64 {
        if self.step_size == 0 {
            return self.base_lr;
        }
        let decays = (epoch / self.step_size) as i32;
        self.base_lr * self.gamma.powi(decays)
    }
}
