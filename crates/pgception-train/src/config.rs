//! Training configuration.
//!
//! Loaded from a TOML or JSON file through the `config` crate, with
//! `PGCEPTION_*` environment variables layered on top, e.g.
//! `PGCEPTION_BATCH_SIZE=64`. Command-line overrides are applied by the
//! `train` binary before [`TrainingConfig::validate`] runs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use pgception_core::Branch;
use pgception_model::{ClassifierMode, DeviceType, PGceptionConfig, WeightInit};
use serde::{Deserialize, Serialize};

use crate::error::{TrainError, TrainResult};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "PGCEPTION";

/// Optimizer used for the training phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// SGD with momentum, no weight decay
    #[default]
    Sgd,
    /// Adam, no weight decay
    Adam,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Sgd => f.write_str("sgd"),
            OptimizerKind::Adam => f.write_str("adam"),
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adam" => Ok(OptimizerKind::Adam),
            other => Err(TrainError::invalid_config(format!(
                "unknown optimizer '{other}', expected 'sgd' or 'adam'"
            ))),
        }
    }
}

/// Complete training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    // -- data --
    pub batch_size: usize,
    /// Seed for mini-batch shuffling and synthetic data
    pub seed: u64,

    // -- model --
    pub action_num: usize,
    pub layers: usize,
    pub classifier_mode: ClassifierMode,
    pub out_channel_list: [usize; Branch::COUNT],
    pub branches: Vec<Branch>,
    pub last_hidden_channels: usize,
    pub bias: bool,
    /// Dropout probability; zero disables dropout
    pub dropout: f32,
    pub batch_norm: bool,
    pub agg_first: bool,
    pub attention: bool,
    pub init: WeightInit,

    // -- optimisation --
    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    /// SGD momentum
    pub momentum: f64,
    pub start_epoch: usize,
    pub epochs: usize,
    /// Multiply the learning rate by `lr_gamma` every `lr_step_size` epochs
    pub lr_schedule: bool,
    pub lr_step_size: usize,
    pub lr_gamma: f64,

    // -- checkpoints & logging --
    pub pretrained: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub save_dir: PathBuf,
    /// Experiment version; sub-directory of `log_dir` and `save_dir`
    pub exp_ver: String,
    pub print_every: usize,
    pub save_every: usize,
    /// First zero-based epoch eligible for a checkpoint
    pub save_after_epoch: usize,

    pub device: DeviceType,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            seed: 42,

            action_num: 24,
            layers: 1,
            classifier_mode: ClassifierMode::Cat,
            out_channel_list: [128, 256, 256, 256],
            branches: Branch::ALL.to_vec(),
            last_hidden_channels: 512,
            bias: true,
            dropout: 0.0,
            batch_norm: false,
            agg_first: true,
            attention: false,
            init: WeightInit::KaimingUniform,

            optimizer: OptimizerKind::Sgd,
            learning_rate: 3e-5,
            momentum: 0.9,
            start_epoch: 0,
            epochs: 700,
            lr_schedule: false,
            lr_step_size: 400,
            lr_gamma: 1.0 / 3.0,

            pretrained: None,
            log_dir: PathBuf::from("log/vcoco"),
            save_dir: PathBuf::from("checkpoints/vcoco"),
            exp_ver: "v1".to_string(),
            print_every: 10,
            save_every: 20,
            save_after_epoch: 399,

            device: DeviceType::Cpu,
        }
    }
}

impl TrainingConfig {
    /// Load configuration from a file, with environment overrides
    pub fn from_file(path: &Path) -> TrainResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load from environment variables over the defaults
    pub fn from_env() -> TrainResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Write the configuration as pretty JSON, creating parent directories
    pub fn to_json(&self, path: &Path) -> TrainResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> TrainResult<()> {
        if self.batch_size == 0 {
            return Err(TrainError::invalid_config("batch_size must be > 0"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(TrainError::invalid_config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(TrainError::invalid_config(format!(
                "momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }
        if self.start_epoch >= self.epochs {
            return Err(TrainError::invalid_config(format!(
                "start_epoch ({}) must be below epochs ({})",
                self.start_epoch, self.epochs
            )));
        }
        if self.print_every == 0 || self.save_every == 0 {
            return Err(TrainError::invalid_config(
                "print_every and save_every must be > 0",
            ));
        }
        if self.lr_schedule && (self.lr_step_size == 0 || self.lr_gamma <= 0.0) {
            return Err(TrainError::invalid_config(
                "lr_step_size must be > 0 and lr_gamma positive",
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TrainError::invalid_config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.exp_ver.is_empty() {
            return Err(TrainError::invalid_config("exp_ver must not be empty"));
        }

        self.model_config().validate()?;
        Ok(())
    }

    /// Model configuration described by this training run
    pub fn model_config(&self) -> PGceptionConfig {
        PGceptionConfig {
            action_num: self.action_num,
            layers: self.layers,
            classifier_mode: self.classifier_mode,
            out_channel_list: self.out_channel_list,
            branches: self.branches.clone(),
            last_hidden_channels: self.last_hidden_channels,
            bias: self.bias,
            dropout: Some(self.dropout).filter(|p| *p > 0.0),
            batch_norm: self.batch_norm,
            agg_first: self.agg_first,
            attention: self.attention,
            init: self.init,
        }
    }

    /// Directory receiving this experiment's checkpoints
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.save_dir.join(&self.exp_ver)
    }

    /// Directory receiving this experiment's loss log
    pub fn run_log_dir(&self) -> PathBuf {
        self.log_dir.join(&self.exp_ver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.learning_rate, 3e-5);
        assert_eq!(config.epochs, 700);
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.model_config().dropout, None);
        assert_eq!(config.checkpoint_dir(), PathBuf::from("checkpoints/vcoco/v1"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad = [
            TrainingConfig { batch_size: 0, ..Default::default() },
            TrainingConfig { learning_rate: 0.0, ..Default::default() },
            TrainingConfig { start_epoch: 700, ..Default::default() },
            TrainingConfig { save_every: 0, ..Default::default() },
            TrainingConfig { layers: 3, ..Default::default() },
            TrainingConfig { dropout: 1.5, ..Default::default() },
            TrainingConfig { dropout: 1.0, ..Default::default() },
            TrainingConfig { dropout: f32::NAN, ..Default::default() },
            TrainingConfig { dropout: f32::INFINITY, ..Default::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }
    }

    #[test]
    fn test_dropout_range() {
        let p = TrainingConfig { dropout: 0.99, ..Default::default() };
        assert!(p.validate().is_ok());
        assert_eq!(p.model_config().dropout, Some(0.99));

        let err = TrainingConfig { dropout: f32::NAN, ..Default::default() }
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("dropout"), "{err}");
    }

    #[test]
    fn test_optimizer_parsing() {
        assert_eq!("ADAM".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adam);
        assert!("rmsprop".parse::<OptimizerKind>().is_err());
    }
}
