//! End-to-end properties of the full model.

use candle_core::{DType, Device, ModuleT, Result, Tensor};
use candle_nn::{VarBuilder, VarMap};
use pgception_core::{Branch, KeypointSet};
use pgception_model::{
    keypoints_to_tensor, load_checkpoint_strict, save_checkpoint, ActionClassifier,
    CheckpointMeta, ClassifierMode, InferenceConfig, PGception, PGceptionConfig,
};

fn build(config: PGceptionConfig) -> Result<(PGception, VarMap)> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = PGception::new(config, vb)?;
    Ok((model, varmap))
}

fn all_finite(t: &Tensor) -> Result<bool> {
    Ok(t.flatten_all()?.to_vec1::<f32>()?.iter().all(|v| v.is_finite()))
}

fn training_defaults() -> PGceptionConfig {
    PGceptionConfig {
        out_channel_list: [128, 256, 256, 256],
        last_hidden_channels: 512,
        ..Default::default()
    }
}

#[test]
fn default_model_produces_finite_logits() -> Result<()> {
    let (model, _varmap) = build(training_defaults())?;
    let x = Tensor::randn(0f32, 1.0, (4, 17, 2), &Device::Cpu)?;

    let train = model.forward_t(&x, true)?;
    let eval = model.forward_t(&x, false)?;

    assert_eq!(train.dims(), &[4, 24]);
    assert_eq!(eval.dims(), &[4, 24]);
    assert!(all_finite(&train)?);
    assert!(all_finite(&eval)?);
    Ok(())
}

#[test]
fn option_variants_keep_output_shape() -> Result<()> {
    let variants = [
        PGceptionConfig {
            attention: true,
            ..Default::default()
        },
        PGceptionConfig {
            layers: 2,
            ..Default::default()
        },
        PGceptionConfig {
            classifier_mode: ClassifierMode::Mean,
            batch_norm: true,
            dropout: Some(0.3),
            ..Default::default()
        },
        PGceptionConfig {
            agg_first: false,
            bias: false,
            branches: vec![Branch::Local, Branch::Dense],
            ..Default::default()
        },
    ];

    let x = Tensor::randn(0f32, 1.0, (3, 17, 2), &Device::Cpu)?;
    for config in variants {
        let (model, _varmap) = build(config.clone())?;
        let y = model.forward_t(&x, true)?;
        assert_eq!(y.dims(), &[3, 24], "{config:?}");
        assert!(all_finite(&y)?, "{config:?}");
    }
    Ok(())
}

/// Runs any candle module through the `ModuleT` interface
fn forward_generic<M: ModuleT>(module: &M, x: &Tensor, train: bool) -> Result<Tensor> {
    module.forward_t(x, train)
}

#[test]
fn module_t_interface_honours_train_flag() -> Result<()> {
    let (model, _varmap) = build(PGceptionConfig {
        out_channel_list: [8, 8, 16, 16],
        last_hidden_channels: 32,
        ..Default::default()
    })?;
    let x = Tensor::randn(0f32, 1.0, (6, 17, 2), &Device::Cpu)?;

    let generic_eval: Vec<Vec<f32>> = forward_generic(&model, &x, false)?.to_vec2()?;
    let direct_eval: Vec<Vec<f32>> = model.forward_t(&x, false)?.to_vec2()?;
    assert_eq!(generic_eval, direct_eval);

    // Training mode normalizes with batch statistics, so it differs from eval
    let generic_train: Vec<Vec<f32>> = forward_generic(&model, &x, true)?.to_vec2()?;
    assert_ne!(generic_train, generic_eval);
    Ok(())
}

#[test]
fn batch_of_one_in_eval_mode() -> Result<()> {
    let (model, _varmap) = build(PGceptionConfig {
        batch_norm: true,
        ..Default::default()
    })?;
    let x = keypoints_to_tensor(&[KeypointSet::zeros()], &Device::Cpu)?;
    assert_eq!(model.forward_t(&x, false)?.dims(), &[1, 24]);
    Ok(())
}

#[test]
fn checkpoint_restores_eval_outputs() -> pgception_core::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = PGceptionConfig {
        out_channel_list: [8, 8, 16, 16],
        last_hidden_channels: 32,
        batch_norm: true,
        ..Default::default()
    };
    let x = Tensor::randn(0f32, 1.0, (2, 17, 2), &Device::Cpu).unwrap();

    let (source, source_vars) = build(config.clone()).unwrap();
    // Move the batch-norm running statistics away from their initial values
    source.forward_t(&x, true).unwrap();
    let expected: Vec<Vec<f32>> = source.forward_t(&x, false).unwrap().to_vec2().unwrap();

    let meta = CheckpointMeta::new(19, 3e-5, 32, config.clone());
    let paths = save_checkpoint(&source_vars, &meta, dir.path(), "checkpoint_20_epoch")?;

    let (target, target_vars) = build(config.clone()).unwrap();
    load_checkpoint_strict(&target_vars, &paths.weights)?;
    let restored: Vec<Vec<f32>> = target.forward_t(&x, false).unwrap().to_vec2().unwrap();
    assert_eq!(expected, restored);

    let classifier = ActionClassifier::load(
        &paths.weights,
        InferenceConfig {
            model: config,
            ..Default::default()
        },
    )
    .unwrap();
    let scores = classifier.predict(&[KeypointSet::zeros()]).unwrap();
    assert_eq!(scores[0].scores.len(), 24);
    Ok(())
}

#[test]
fn checkpoint_from_other_architecture_is_rejected() -> pgception_core::Result<()> {
    let dir = tempfile::tempdir()?;
    let small = PGceptionConfig {
        out_channel_list: [4, 4, 4, 4],
        last_hidden_channels: 8,
        ..Default::default()
    };
    let (_model, vars) = build(small.clone()).unwrap();
    let meta = CheckpointMeta::new(0, 3e-5, 32, small.clone());
    let paths = save_checkpoint(&vars, &meta, dir.path(), "small")?;

    let (_other, other_vars) = build(PGceptionConfig {
        attention: true,
        ..small
    })
    .unwrap();
    assert!(load_checkpoint_strict(&other_vars, &paths.weights).is_err());
    Ok(())
}
