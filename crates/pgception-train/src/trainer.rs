//! Training loop: train and validation phases per epoch, periodic
//! checkpoints and a JSON-lines loss log.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use pgception_model::{load_checkpoint_strict, save_checkpoint, CheckpointMeta, PGception};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TrainingConfig;
use crate::dataset::{DataLoader, PoseDataset};
use crate::error::{TrainError, TrainResult};
use crate::losses::bce_with_logits;
use crate::optim::{StepLr, TrainOptimizer};

/// Losses recorded for one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// Zero-based epoch
    pub epoch: usize,
    pub learning_rate: f64,
    /// Per-sample average training loss
    pub train_loss: f32,
    /// Per-sample average validation loss; `None` without validation data
    pub val_loss: Option<f32>,
    /// Checkpoint written after this epoch
    pub checkpoint: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Train,
    Val,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Val => "val",
        }
    }
}

/// Owns the model, its variables and the optimizer for one training run
pub struct Trainer {
    config: TrainingConfig,
    device: Device,
    varmap: VarMap,
    model: PGception,
    optimizer: TrainOptimizer,
    schedule: Option<StepLr>,
}

impl Trainer {
    /// Build the model and optimizer, loading pretrained weights if configured
    pub fn new(config: TrainingConfig) -> TrainResult<Self> {
        config.validate()?;

        let device = config.device.device()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = PGception::new(config.model_config(), vb)?;

        if let Some(path) = &config.pretrained {
            info!("Loading pretrained model {}", path.display());
            load_checkpoint_strict(&varmap, path)?;
        }

        let optimizer = TrainOptimizer::new(varmap.all_vars(), &config)?;
        let schedule = config
            .lr_schedule
            .then(|| StepLr::new(config.learning_rate, config.lr_step_size, config.lr_gamma));

        info!(
            optimizer = %config.optimizer,
            lr = config.learning_rate,
            batch_size = config.batch_size,
            "Trainer ready"
        );

        Ok(Self {
            config,
            device,
            varmap,
            model,
            optimizer,
            schedule,
        })
    }

    /// Run epochs `start_epoch..epochs` and return one summary per epoch
    pub fn run(
        &mut self,
        train: &dyn PoseDataset,
        val: &dyn PoseDataset,
    ) -> TrainResult<Vec<EpochSummary>> {
        if train.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        if val.is_empty() {
            warn!("Validation dataset is empty, skipping the validation phase");
        }

        let checkpoint_dir = self.config.checkpoint_dir();
        fs::create_dir_all(&checkpoint_dir)?;
        let log_dir = self.config.run_log_dir();
        fs::create_dir_all(&log_dir)?;
        let mut loss_log = BufWriter::new(File::create(log_dir.join("loss.jsonl"))?);

        let train_loader = DataLoader::new(train, self.config.batch_size, true, self.config.seed);
        let val_loader = DataLoader::new(val, self.config.batch_size, true, self.config.seed);

        info!(
            "Training on {} ({} samples), validating on {} ({} samples)",
            train.name(),
            train.len(),
            val.name(),
            val.len()
        );

        let mut history = Vec::with_capacity(self.config.epochs - self.config.start_epoch);
        for epoch in self.config.start_epoch..self.config.epochs {
            if let Some(schedule) = &self.schedule {
                self.optimizer.set_learning_rate(schedule.lr_at(epoch));
            }

            let train_loss = self.run_phase(Phase::Train, &train_loader, epoch)?;
            let val_loss = if val.is_empty() {
                None
            } else {
                Some(self.run_phase(Phase::Val, &val_loader, epoch)?)
            };

            let checkpoint = if self.should_save(epoch) {
                let meta = CheckpointMeta::new(
                    epoch,
                    self.optimizer.learning_rate(),
                    self.config.batch_size,
                    self.config.model_config(),
                );
                let name = format!("checkpoint_{}_epoch", epoch + 1);
                Some(save_checkpoint(&self.varmap, &meta, &checkpoint_dir, &name)?.weights)
            } else {
                None
            };

            let summary = EpochSummary {
                epoch,
                learning_rate: self.optimizer.learning_rate(),
                train_loss,
                val_loss,
                checkpoint,
            };
            writeln!(loss_log, "{}", serde_json::to_string(&summary)?)?;
            history.push(summary);
        }
        loss_log.flush()?;

        info!("Finished training");
        Ok(history)
    }

    fn should_save(&self, epoch: usize) -> bool {
        (epoch + 1) % self.config.save_every == 0 && epoch >= self.config.save_after_epoch
    }

    /// One pass over `loader`, returning the per-sample average loss
    fn run_phase(&mut self, phase: Phase, loader: &DataLoader<'_>, epoch: usize) -> TrainResult<f32> {
        let start = Instant::now();
        let train = phase == Phase::Train;
        let mut running_loss = 0.0f64;
        let mut seen = 0usize;

        for indices in loader.batch_indices(epoch) {
            let batch = loader.load(&indices, self.config.action_num, &self.device)?;
            let logits = self.model.forward_t(&batch.inputs, train)?;
            let loss = bce_with_logits(&logits, &batch.labels)?;
            if train {
                self.optimizer.backward_step(&loss)?;
            }

            let value = loss.to_scalar::<f32>()?;
            running_loss += value as f64 * batch.len as f64;
            seen += batch.len;
            debug!(phase = phase.name(), epoch, loss = value, "batch");
        }

        let epoch_loss = (running_loss / seen.max(1) as f64) as f32;
        if epoch % self.config.print_every == 0 {
            info!(
                "[{}] Epoch: {}/{} Loss: {:.6} Execution time: {:.2}s",
                phase.name(),
                epoch + 1,
                self.config.epochs,
                epoch_loss,
                start.elapsed().as_secs_f64()
            );
        }
        Ok(epoch_loss)
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn model(&self) -> &PGception {
        &self.model
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }
}
