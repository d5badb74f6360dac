//! # PGception-Train
//!
//! Training pipeline for the PGception action recognizer: configuration,
//! pose datasets, the multi-label loss, optimizers and the epoch loop.
//!
//! ```rust,no_run
//! use pgception_train::config::TrainingConfig;
//! use pgception_train::dataset::SyntheticPoseDataset;
//! use pgception_train::trainer::Trainer;
//!
//! let config = TrainingConfig { epochs: 2, ..Default::default() };
//! let train = SyntheticPoseDataset::new(64, config.action_num, config.seed);
//! let val = SyntheticPoseDataset::new(16, config.action_num, config.seed + 1);
//! let mut trainer = Trainer::new(config).unwrap();
//! let history = trainer.run(&train, &val).unwrap();
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod losses;
pub mod optim;
pub mod trainer;

pub use error::{TrainError, TrainResult};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
