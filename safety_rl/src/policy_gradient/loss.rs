//! Vanilla policy-gradient loss.
//!
//! `L = -mean(log π(a|s) · A)`
//!
//! With SBE advantages, `A` is a reach-avoid outcome, so the sign of the
//! gradient is fixed by how the advantages were produced, not by this loss.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::{Result, SafetyRlError};

/// Policy-gradient loss over a batch.
///
/// # Arguments
///
/// * `log_probs` - `log π(a_t|s_t)` `[T]`
/// * `advantages` - per-step advantages `[T]` (treated as constants)
pub fn policy_gradient_loss<B: Backend>(
    log_probs: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
) -> Tensor<B, 1> {
    (log_probs * advantages.detach()).mean().neg()
}

/// Scalar version of [`policy_gradient_loss`].
pub fn policy_gradient_loss_scalar(log_probs: &[f32], advantages: &[f32]) -> Result<f32> {
    if log_probs.len() != advantages.len() {
        return Err(SafetyRlError::BatchMismatch {
            field: "advantages",
            expected: log_probs.len(),
            found: advantages.len(),
        });
    }
    if log_probs.is_empty() {
        return Ok(0.0);
    }
    let sum: f32 = log_probs.iter().zip(advantages).map(|(lp, a)| lp * a).sum();
    Ok(-sum / log_probs.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor_critic::tensor_to_scalar;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_scalar_loss() {
        let loss = policy_gradient_loss_scalar(&[-0.5, -1.0], &[2.0, -1.0]).unwrap();
        // -((-1.0) + 1.0) / 2
        assert!((loss - 0.0).abs() < 1e-6);

        let loss = policy_gradient_loss_scalar(&[-0.5, -0.5], &[1.0, 1.0]).unwrap();
        assert!((loss - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_scalar_loss_length_mismatch() {
        assert!(policy_gradient_loss_scalar(&[0.0], &[1.0, 2.0]).is_err());
        assert_eq!(policy_gradient_loss_scalar(&[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn test_tensor_loss_matches_scalar() {
        let device = Default::default();
        let lp = [-0.2f32, -1.3, -0.7];
        let adv = [0.5f32, -2.0, 1.0];
        let loss = policy_gradient_loss(
            Tensor::<TestBackend, 1>::from_floats(lp.as_slice(), &device),
            Tensor::<TestBackend, 1>::from_floats(adv.as_slice(), &device),
        );

        let expected = policy_gradient_loss_scalar(&lp, &adv).unwrap();
        assert!((tensor_to_scalar(&loss) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_gradient_scales_with_advantage() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();
        let lp = Tensor::<B, 1>::from_floats([-0.5, -0.5], &device).require_grad();
        let adv = Tensor::<B, 1>::from_floats([2.0, -4.0], &device);

        let grads = policy_gradient_loss(lp.clone(), adv).backward();
        let grad = lp.grad(&grads).unwrap().into_data().to_vec::<f32>().unwrap();

        // dL/dlp_t = -A_t / T
        assert!((grad[0] - (-1.0)).abs() < 1e-6);
        assert!((grad[1] - 2.0).abs() < 1e-6);
    }
}
