//! `train` binary: entry point for the PGception training pipeline.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin train -- --config train.toml --dataset poses.json
//! cargo run --bin train -- --dry-run --epochs 5 --save-after-epoch 0
//! ```

use std::path::PathBuf;

use clap::Parser;
use pgception_core::Branch;
use pgception_model::{ClassifierMode, DeviceType};
use pgception_train::config::{OptimizerKind, TrainingConfig};
use pgception_train::dataset::{PoseDataset, PoseSplits, SyntheticPoseDataset};
use pgception_train::trainer::Trainer;
use pgception_train::TrainResult;
use tracing::{error, info};

/// Command-line arguments for the training binary.
#[derive(Parser, Debug)]
#[command(
    name = "train",
    version,
    about = "PGception action recognition training",
    long_about = None
)]
struct Args {
    /// TOML or JSON configuration file; defaults are used when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Dataset file with `train` and `val` pose samples.
    #[arg(long, value_name = "FILE")]
    dataset: Option<PathBuf>,

    /// Use the deterministic synthetic dataset instead of `--dataset`.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Number of synthetic training samples when `--dry-run` is active.
    #[arg(long, default_value_t = 256)]
    dry_run_samples: usize,

    #[arg(long = "batch-size", visible_alias = "b-s")]
    batch_size: Option<usize>,

    #[arg(long)]
    lr: Option<f64>,

    /// Dropout probability; 0 disables dropout.
    #[arg(long = "dropout", visible_alias = "d-p")]
    dropout: Option<f32>,

    /// Accepts true/false, yes/no, on/off or 1/0.
    #[arg(long, value_parser = clap::builder::BoolishValueParser::new())]
    bias: Option<bool>,

    #[arg(long, value_parser = clap::builder::BoolishValueParser::new())]
    bn: Option<bool>,

    #[arg(long, value_parser = clap::builder::BoolishValueParser::new())]
    attn: Option<bool>,

    #[arg(long = "epochs", visible_alias = "epoch")]
    epochs: Option<usize>,

    /// Per-branch output widths: identity,local,extended,dense.
    #[arg(long = "out-channels", visible_alias = "o-c-l", value_delimiter = ',')]
    out_channels: Option<Vec<usize>>,

    /// Enabled branches, e.g. `local,dense` or `1,3`.
    #[arg(long, value_delimiter = ',')]
    branches: Option<Vec<Branch>>,

    #[arg(long = "last-hidden", visible_alias = "last-h-c")]
    last_hidden: Option<usize>,

    #[arg(long)]
    start_epoch: Option<usize>,

    /// Classification head: cat or mean.
    #[arg(long = "classifier", visible_alias = "c-m")]
    classifier: Option<ClassifierMode>,

    /// sgd or adam.
    #[arg(long)]
    optim: Option<OptimizerKind>,

    /// Number of action classes.
    #[arg(long = "actions", visible_alias = "a-n")]
    actions: Option<usize>,

    /// Number of stacked blocks (1 or 2).
    #[arg(long = "layers", visible_alias = "n-layers")]
    layers: Option<usize>,

    /// Enable the step learning-rate schedule.
    #[arg(long, default_value_t = false)]
    lr_schedule: bool,

    /// Checkpoint to load before training.
    #[arg(short, long, value_name = "FILE")]
    pretrained: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,

    /// Experiment version, used as sub-directory of the log and save dirs.
    #[arg(long = "exp-ver", visible_alias = "e-v")]
    exp_ver: Option<String>,

    #[arg(long)]
    print_every: Option<usize>,

    #[arg(long)]
    save_every: Option<usize>,

    /// First zero-based epoch eligible for a checkpoint.
    #[arg(long)]
    save_after_epoch: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Train on CUDA device 0.
    #[arg(long, default_value_t = false)]
    cuda: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(&self, config: &mut TrainingConfig) -> TrainResult<()> {
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.lr {
            config.learning_rate = v;
        }
        if let Some(v) = self.dropout {
            config.dropout = v;
        }
        if let Some(v) = self.bias {
            config.bias = v;
        }
        if let Some(v) = self.bn {
            config.batch_norm = v;
        }
        if let Some(v) = self.attn {
            config.attention = v;
        }
        if let Some(v) = self.epochs {
            config.epochs = v;
        }
        if let Some(widths) = &self.out_channels {
            config.out_channel_list = widths.as_slice().try_into().map_err(|_| {
                pgception_train::TrainError::invalid_config(format!(
                    "--out-channels needs {} values, got {}",
                    Branch::COUNT,
                    widths.len()
                ))
            })?;
        }
        if let Some(branches) = &self.branches {
            config.branches = branches.clone();
        }
        if let Some(v) = self.last_hidden {
            config.last_hidden_channels = v;
        }
        if let Some(v) = self.start_epoch {
            config.start_epoch = v;
        }
        if let Some(v) = self.classifier {
            config.classifier_mode = v;
        }
        if let Some(v) = self.optim {
            config.optimizer = v;
        }
        if let Some(v) = self.actions {
            config.action_num = v;
        }
        if let Some(v) = self.layers {
            config.layers = v;
        }
        if self.lr_schedule {
            config.lr_schedule = true;
        }
        if let Some(path) = &self.pretrained {
            config.pretrained = Some(path.clone());
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
        if let Some(dir) = &self.save_dir {
            config.save_dir = dir.clone();
        }
        if let Some(v) = &self.exp_ver {
            config.exp_ver = v.clone();
        }
        if let Some(v) = self.print_every {
            config.print_every = v;
        }
        if let Some(v) = self.save_every {
            config.save_every = v;
        }
        if let Some(v) = self.save_after_epoch {
            config.save_after_epoch = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if self.cuda {
            config.device = DeviceType::Cuda(0);
        }
        Ok(())
    }
}

fn main() {
    let args = Args::parse();

    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .init();

    info!("PGception training v{}", pgception_train::VERSION);

    if let Err(e) = run(&args) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> TrainResult<()> {
    let mut config = match args.config.as_deref() {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            TrainingConfig::from_file(path)?
        }
        None => {
            info!("No configuration file provided, using defaults with environment overrides");
            TrainingConfig::from_env()?
        }
    };
    args.apply(&mut config)?;
    config.validate()?;

    info!("  batch size   : {}", config.batch_size);
    info!("  learning rate: {}", config.learning_rate);
    info!("  epochs       : {}..{}", config.start_epoch, config.epochs);
    info!("  optimizer    : {}", config.optimizer);
    info!("  classifier   : {}", config.classifier_mode);
    info!("  out channels : {:?}", config.out_channel_list);
    info!("  device       : {:?}", config.device);

    config.to_json(&config.run_log_dir().join("config.json"))?;

    if args.dry_run {
        info!("DRY RUN, using synthetic dataset ({} samples)", args.dry_run_samples);
        let train = SyntheticPoseDataset::new(args.dry_run_samples, config.action_num, config.seed);
        let val = SyntheticPoseDataset::new(
            (args.dry_run_samples / 4).max(1),
            config.action_num,
            config.seed.wrapping_add(1_000_003),
        );
        return train_on(config, &train, &val);
    }

    let Some(path) = args.dataset.as_deref() else {
        return Err(pgception_train::TrainError::invalid_config(
            "either --dataset FILE or --dry-run is required",
        ));
    };
    info!("Loading dataset from {}", path.display());
    let (train, val) = PoseSplits::from_file(path, config.action_num)?.into_datasets();
    train_on(config, &train, &val)
}

fn train_on(config: TrainingConfig, train: &dyn PoseDataset, val: &dyn PoseDataset) -> TrainResult<()> {
    let mut trainer = Trainer::new(config)?;
    let history = trainer.run(train, val)?;

    if let Some(last) = history.last() {
        info!(
            "Final epoch {}: train loss {:.6}, val loss {}",
            last.epoch + 1,
            last.train_loss,
            last.val_loss
                .map(|l| format!("{l:.6}"))
                .unwrap_or_else(|| "n/a".to_string())
        );
    }
    Ok(())
}
