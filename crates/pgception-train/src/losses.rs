//! Multi-label classification loss.

use candle_core::{Result, Tensor};

/// Binary cross-entropy on raw logits, averaged over every element.
///
/// Uses `max(x, 0) - x * t + ln(1 + exp(-|x|))`, which stays finite for
/// large logits of either sign.
pub fn bce_with_logits(logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
    if logits.dims() != targets.dims() {
        candle_core::bail!(
            "logits {:?} and targets {:?} differ in shape",
            logits.dims(),
            targets.dims()
        );
    }

    let positive = logits.relu()?;
    let cross = logits.mul(targets)?;
    let soft = logits.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;

    positive.sub(&cross)?.add(&soft)?.mean_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn scalar(t: &Tensor) -> f32 {
        t.to_scalar::<f32>().unwrap()
    }

    #[test]
    fn test_zero_logit_is_ln2() -> Result<()> {
        let logits = Tensor::new(&[[0.0f32]], &Device::Cpu)?;
        let targets = Tensor::new(&[[1.0f32]], &Device::Cpu)?;
        let loss = bce_with_logits(&logits, &targets)?;
        assert!((scalar(&loss) - std::f32::consts::LN_2).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_matches_closed_form() -> Result<()> {
        let x = [2.0f32, -1.5, 0.3, -0.7];
        let t = [1.0f32, 0.0, 0.0, 1.0];
        let logits = Tensor::new(&x, &Device::Cpu)?.reshape((2, 2))?;
        let targets = Tensor::new(&t, &Device::Cpu)?.reshape((2, 2))?;

        let expected: f32 = x
            .iter()
            .zip(t.iter())
            .map(|(&x, &t)| {
                let p = 1.0 / (1.0 + (-x).exp());
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            })
            .sum::<f32>()
            / 4.0;

        let loss = scalar(&bce_with_logits(&logits, &targets)?);
        assert!((loss - expected).abs() < 1e-5, "{loss} vs {expected}");
        Ok(())
    }

    #[test]
    fn test_large_logits_stay_finite() -> Result<()> {
        let logits = Tensor::new(&[[200.0f32, -200.0]], &Device::Cpu)?;
        let targets = Tensor::new(&[[0.0f32, 1.0]], &Device::Cpu)?;
        let loss = scalar(&bce_with_logits(&logits, &targets)?);
        assert!((loss - 200.0).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let logits = Tensor::zeros((2, 3), candle_core::DType::F32, &Device::Cpu).unwrap();
        let targets = Tensor::zeros((2, 4), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(bce_with_logits(&logits, &targets).is_err());
    }
}
