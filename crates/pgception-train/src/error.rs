//! Error types for the PGception training pipeline.
//!
//! ```text
//! TrainError
//! ├── Core     (model configuration, checkpoints, dataset files)
//! ├── Candle   (tensor operations)
//! ├── Config   (file / environment loading)
//! └── Io, Json
//! ```

use thiserror::Error;

/// Result alias used by every fallible function in this crate.
pub type TrainResult<T> = Result<T, TrainError>;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Core(#[from] pgception_core::Error),

    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Configuration loading error: {0}")]
    Config(#[from] config::ConfigError),

    /// A loaded configuration failed validation.
    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The training split has no samples.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// A sample's label vector does not cover every action.
    #[error("Sample {index} has {actual} labels, expected {expected}")]
    LabelWidth {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Index {index} is out of bounds for dataset of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

impl TrainError {
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        TrainError::InvalidConfig(msg.into())
    }
}
