//! Advantage postprocessing for policy-gradient trajectories.
//!
//! Three estimators, selected by [`AdvantageConfig`]:
//!
//! - **SBE outcome** (`use_sbe`): `A_t` is the reach-avoid outcome of the
//!   trajectory suffix starting at `t`,
//!   `v_T = r_T`, `v_t = (1-γ)·r_t + γ·min(r_t, v_{t+1})`.
//!   The fold is a running minimum, so it has no λ-return form and GAE must
//!   be off.
//! - **GAE** (`use_gae`): `A_t = Σ (γλ)^k δ_{t+k}` with
//!   `δ_t = r_t + γ V(s_{t+1}) - V(s_t)`, bootstrapped from `last_r`.
//! - **Discounted returns**: `G_t = r_t + γ G_{t+1}`, minus `V(s_t)` when
//!   value predictions are present.
//!
//! Every fold runs backwards over one trajectory in episode order. Batches
//! from several workers are processed independently and only concatenated
//! afterwards.

use serde::{Deserialize, Serialize};

use crate::core::sbe::{discounted_returns, sbe_outcome};
use crate::error::{Result, SafetyRlError};

/// One trajectory with its postprocessed columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    /// Rewards `[T]`, in episode order.
    pub rewards: Vec<f32>,
    /// Value predictions `V(s_t)` `[T]`, if a critic is attached.
    pub vf_preds: Option<Vec<f32>>,
    /// Advantages `[T]`, filled by [`compute_advantages`].
    pub advantages: Vec<f32>,
    /// Value-function regression targets `[T]`, filled by
    /// [`compute_advantages`]. All zeros when no critic is attached.
    pub value_targets: Vec<f32>,
}

impl SampleBatch {
    /// Trajectory without value predictions.
    pub fn new(rewards: Vec<f32>) -> Self {
        Self {
            rewards,
            ..Default::default()
        }
    }

    /// Attach value predictions.
    pub fn with_vf_preds(mut self, vf_preds: Vec<f32>) -> Self {
        self.vf_preds = Some(vf_preds);
        self
    }

    /// Trajectory length.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Whether the trajectory has no steps.
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Concatenate already postprocessed batches, preserving order.
    ///
    /// Value predictions are kept only if every batch has them.
    pub fn concat(batches: &[SampleBatch]) -> Self {
        let mut out = Self::default();
        let keep_vf = !batches.is_empty() && batches.iter().all(|b| b.vf_preds.is_some());
        let mut vf = Vec::new();
        for b in batches {
            out.rewards.extend_from_slice(&b.rewards);
            out.advantages.extend_from_slice(&b.advantages);
            out.value_targets.extend_from_slice(&b.value_targets);
            if let Some(v) = &b.vf_preds {
                vf.extend_from_slice(v);
            }
        }
        if keep_vf {
            out.vf_preds = Some(vf);
        }
        out
    }
}

/// Advantage estimator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvantageConfig {
    /// Discount factor.
    pub gamma: f32,
    /// GAE λ parameter.
    pub lambda: f32,
    /// Use generalised advantage estimation.
    pub use_gae: bool,
    /// Use the SBE trajectory outcome.
    pub use_sbe: bool,
}

impl Default for AdvantageConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            lambda: 1.0,
            use_gae: false,
            use_sbe: false,
        }
    }
}

impl AdvantageConfig {
    /// Plain discounted returns.
    pub fn new() -> Self {
        Self::default()
    }

    /// SBE outcome advantages with discount `gamma`.
    pub fn sbe(gamma: f32) -> Self {
        Self {
            gamma,
            use_sbe: true,
            ..Self::default()
        }
    }

    /// GAE with discount `gamma` and parameter `lambda`.
    pub fn gae(gamma: f32, lambda: f32) -> Self {
        Self {
            gamma,
            lambda,
            use_gae: true,
            ..Self::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.use_gae && self.use_sbe {
            return Err(SafetyRlError::InvalidConfig(
                "use_gae cannot be combined with use_sbe".into(),
            ));
        }
        // SBE needs γ < 1; returns and GAE also accept γ = 1.
        let (gamma_ok, range) = if self.use_sbe {
            (self.gamma > 0.0 && self.gamma < 1.0, "(0, 1)")
        } else {
            (self.gamma > 0.0 && self.gamma <= 1.0, "(0, 1]")
        };
        if !gamma_ok {
            return Err(SafetyRlError::InvalidConfig(format!(
                "gamma must lie in {}, got {}",
                range, self.gamma
            )));
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(SafetyRlError::InvalidConfig(format!(
                "lambda must lie in [0, 1], got {}",
                self.lambda
            )));
        }
        Ok(())
    }
}

/// GAE advantages and returns for a single trajectory that ends with
/// bootstrap value `last_value`.
///
/// Returns `(advantages, returns)`, both `[T]`.
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    last_value: f32,
    gamma: f32,
    lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let n = rewards.len().min(values.len());
    let mut advantages = vec![0.0f32; n];
    let mut returns = vec![0.0f32; n];

    let mut gae = 0.0f32;
    let mut next_value = last_value;
    for t in (0..n).rev() {
        let delta = rewards[t] + gamma * next_value - values[t];
        gae = delta + gamma * lambda * gae;

        advantages[t] = gae;
        returns[t] = gae + values[t];
        next_value = values[t];
    }

    (advantages, returns)
}

/// Fill `advantages` and `value_targets` for one trajectory.
///
/// `last_r` bootstraps the GAE and discounted estimators; the SBE outcome
/// ignores it.
pub fn compute_advantages(
    mut batch: SampleBatch,
    last_r: f32,
    config: &AdvantageConfig,
) -> Result<SampleBatch> {
    config.validate()?;
    let n = batch.len();
    if let Some(vf) = &batch.vf_preds {
        if vf.len() != n {
            return Err(SafetyRlError::BatchMismatch {
                field: "vf_preds",
                expected: n,
                found: vf.len(),
            });
        }
    }

    if config.use_sbe {
        batch.advantages = sbe_outcome(&batch.rewards, config.gamma);
        batch.value_targets = vec![0.0; n];
    } else if config.use_gae {
        let vf = batch.vf_preds.as_ref().ok_or_else(|| {
            SafetyRlError::InvalidConfig("use_gae requires value predictions".into())
        })?;
        let (advantages, returns) =
            compute_gae(&batch.rewards, vf, last_r, config.gamma, config.lambda);
        batch.advantages = advantages;
        batch.value_targets = returns;
    } else {
        let returns = discounted_returns(&batch.rewards, config.gamma, last_r);
        match &batch.vf_preds {
            Some(vf) => {
                batch.advantages = returns.iter().zip(vf).map(|(g, v)| g - v).collect();
                batch.value_targets = returns;
            }
            None => {
                batch.advantages = returns;
                batch.value_targets = vec![0.0; n];
            }
        }
    }

    Ok(batch)
}

/// SBE postprocessing step: outcome advantages, no GAE, no bootstrap.
pub fn postprocess_sbe_advantages(batch: SampleBatch, gamma: f32) -> Result<SampleBatch> {
    compute_advantages(batch, 0.0, &AdvantageConfig::sbe(gamma))
}

/// Postprocess trajectories collected by independent workers.
///
/// Each batch is folded on its own, in episode order, with `last_r = 0`.
/// The output keeps the input order so it can be passed to
/// [`SampleBatch::concat`].
pub fn postprocess_workers(
    batches: Vec<SampleBatch>,
    config: &AdvantageConfig,
) -> Result<Vec<SampleBatch>> {
    batches
        .into_iter()
        .map(|batch| compute_advantages(batch, 0.0, config))
        .collect()
}
