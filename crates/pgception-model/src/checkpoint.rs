//! Strict safetensors checkpoints with a JSON metadata sidecar.
//!
//! `<name>.safetensors` holds every variable of the model's `VarMap`
//! (including batch-norm running statistics); `<name>.json` records the
//! configuration and hyper-parameters the weights were trained with.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use candle_core::Tensor;
use candle_nn::VarMap;
use chrono::{DateTime, Utc};
use pgception_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::PGceptionConfig;

/// Hyper-parameters stored next to a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Zero-based epoch after which the checkpoint was written
    pub epoch: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub model: PGceptionConfig,
    pub saved_at: DateTime<Utc>,
}

impl CheckpointMeta {
    pub fn new(epoch: usize, learning_rate: f64, batch_size: usize, model: PGceptionConfig) -> Self {
        Self {
            epoch,
            learning_rate,
            batch_size,
            model,
            saved_at: Utc::now(),
        }
    }
}

/// Paths written by [`save_checkpoint`]
#[derive(Debug, Clone)]
pub struct CheckpointPaths {
    pub weights: PathBuf,
    pub meta: PathBuf,
}

impl CheckpointPaths {
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            weights: dir.join(format!("{name}.safetensors")),
            meta: dir.join(format!("{name}.json")),
        }
    }
}

/// Save all variables and the metadata sidecar into `dir`
pub fn save_checkpoint(
    varmap: &VarMap,
    meta: &CheckpointMeta,
    dir: &Path,
    name: &str,
) -> Result<CheckpointPaths> {
    fs::create_dir_all(dir)?;
    let paths = CheckpointPaths::new(dir, name);

    varmap
        .save(&paths.weights)
        .map_err(|e| Error::checkpoint(e.to_string(), &paths.weights))?;
    fs::write(&paths.meta, serde_json::to_string_pretty(meta)?)?;

    info!("Saved checkpoint {}", paths.weights.display());
    Ok(paths)
}

/// Read the metadata sidecar written next to `weights`
pub fn read_checkpoint_meta(weights: &Path) -> Result<CheckpointMeta> {
    let meta_path = weights.with_extension("json");
    let raw = fs::read_to_string(&meta_path)
        .map_err(|e| Error::checkpoint(e.to_string(), &meta_path))?;
    Ok(serde_json::from_str(&raw)?)
}

/// Load `weights` into `varmap`, requiring an exact match of names and shapes.
///
/// Nothing is written unless every variable matches.
pub fn load_checkpoint_strict(varmap: &VarMap, weights: &Path) -> Result<()> {
    let data = varmap.data().lock().map_err(|_| {
        Error::ModelLoad("variable map lock poisoned".to_string())
    })?;

    let device = match data.values().next() {
        Some(var) => var.device().clone(),
        None => return Err(Error::checkpoint("model has no variables", weights)),
    };

    let tensors: HashMap<String, Tensor> = candle_core::safetensors::load(weights, &device)
        .map_err(|e| Error::checkpoint(e.to_string(), weights))?;

    let expected: BTreeSet<&String> = data.keys().collect();
    let found: BTreeSet<&String> = tensors.keys().collect();

    let missing: Vec<&str> = expected.difference(&found).map(|s| s.as_str()).collect();
    if !missing.is_empty() {
        return Err(Error::checkpoint(
            format!("missing parameters: {}", missing.join(", ")),
            weights,
        ));
    }
    let unexpected: Vec<&str> = found.difference(&expected).map(|s| s.as_str()).collect();
    if !unexpected.is_empty() {
        return Err(Error::checkpoint(
            format!("unexpected parameters: {}", unexpected.join(", ")),
            weights,
        ));
    }

    let mismatched: Vec<String> = data
        .iter()
        .filter(|(name, var)| tensors[*name].dims() != var.dims())
        .map(|(name, var)| format!("{name} {:?} vs {:?}", var.dims(), tensors[name].dims()))
        .collect();
    if !mismatched.is_empty() {
        return Err(Error::checkpoint(
            format!("shape mismatch: {}", mismatched.join(", ")),
            weights,
        ));
    }

    for (name, var) in data.iter() {
        let value = tensors[name]
            .to_dtype(var.dtype())
            .map_err(|e| Error::ModelLoad(e.to_string()))?;
        var.set(&value)
            .map_err(|e| Error::ModelLoad(format!("{name}: {e}")))?;
    }

    info!(
        "Loaded {} parameters from {}",
        data.len(),
        weights.display()
    );
    Ok(())
}
