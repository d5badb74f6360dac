//! Integration tests for [`pgception_train::config`].

use pgception_model::ClassifierMode;
use pgception_train::config::{OptimizerKind, TrainingConfig};

#[test]
fn default_config_is_valid() {
    TrainingConfig::default()
        .validate()
        .expect("default TrainingConfig must be valid");
}

#[test]
fn toml_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("train.toml");
    std::fs::write(
        &path,
        r#"
batch_size = 16
learning_rate = 0.001
optimizer = "adam"
classifier_mode = "mean"
out_channel_list = [8, 8, 16, 16]
layers = 2
exp_ver = "v7"
"#,
    )
    .unwrap();

    let config = TrainingConfig::from_file(&path).unwrap();
    assert_eq!(config.batch_size, 16);
    assert_eq!(config.learning_rate, 0.001);
    assert_eq!(config.optimizer, OptimizerKind::Adam);
    assert_eq!(config.classifier_mode, ClassifierMode::Mean);
    assert_eq!(config.out_channel_list, [8, 8, 16, 16]);
    assert_eq!(config.layers, 2);
    assert_eq!(config.exp_ver, "v7");
    // Untouched fields keep their defaults
    assert_eq!(config.epochs, 700);
    assert_eq!(config.last_hidden_channels, 512);
    assert!(config.validate().is_ok());
}

#[test]
fn unknown_classifier_mode_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "classifier_mode = \"max\"\n").unwrap();

    assert!(TrainingConfig::from_file(&path).is_err());
}

#[test]
fn json_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/config.json");
    let config = TrainingConfig {
        dropout: 0.25,
        attention: true,
        ..Default::default()
    };
    config.to_json(&path).unwrap();

    let loaded = TrainingConfig::from_file(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.model_config().dropout, Some(0.25));
}
