//! Configuration for the twin-critic actor-critic learner.
//!
//! [`TrainingConfig`] carries the settings shared by any replay-based learner;
//! [`ActorCriticConfig`] composes it with the actor and target-network knobs.

use std::path::PathBuf;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, Optimizer};
use burn::tensor::backend::AutodiffBackend;

use crate::core::target_network::TargetSync;
use crate::error::{Result, SafetyRlError};
use crate::scheduling::{Schedule, StepDecay, StepMargin};

/// Settings shared by replay-based learners.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Number of critic updates before `learn` returns.
    pub max_updates: usize,
    /// Episode truncation length.
    pub max_episode_steps: usize,
    /// Replay buffer capacity.
    pub memory_capacity: usize,
    /// Minibatch size.
    pub batch_size: usize,
    /// Number of checkpoints kept on disk per network.
    pub max_models: usize,
    /// Seed for the learner's RNG.
    pub seed: u64,
    /// Exploration scale, stepped once per update.
    pub epsilon: StepDecay,
    /// Discount, annealed towards 1.
    pub gamma: StepMargin,
    /// Critic learning rate.
    pub critic_lr: StepDecay,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_updates: 2_000_000,
            max_episode_steps: 200,
            memory_capacity: 10_000,
            batch_size: 32,
            max_models: 5,
            seed: 0,
            epsilon: StepDecay::new(0.95, 0.05, 1, 0.5),
            gamma: StepMargin::new(0.9, 0.999_999_99, 200, 0.5),
            critic_lr: StepDecay::new(1e-3, 1e-4, 1, 0.5),
        }
    }
}

impl TrainingConfig {
    /// Create config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of updates.
    pub fn with_max_updates(mut self, n: usize) -> Self {
        self.max_updates = n;
        self
    }

    /// Set the episode truncation length.
    pub fn with_max_episode_steps(mut self, n: usize) -> Self {
        self.max_episode_steps = n;
        self
    }

    /// Set the replay buffer capacity.
    pub fn with_memory_capacity(mut self, n: usize) -> Self {
        self.memory_capacity = n;
        self
    }

    /// Set the minibatch size.
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// Set the number of checkpoints kept per network.
    pub fn with_max_models(mut self, n: usize) -> Self {
        self.max_models = n;
        self
    }

    /// Set the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the exploration schedule.
    pub fn with_epsilon(mut self, schedule: StepDecay) -> Self {
        self.epsilon = schedule;
        self
    }

    /// Set the discount schedule.
    pub fn with_gamma(mut self, schedule: StepMargin) -> Self {
        self.gamma = schedule;
        self
    }

    /// Set the critic learning-rate schedule.
    pub fn with_critic_lr(mut self, schedule: StepDecay) -> Self {
        self.critic_lr = schedule;
        self
    }

    /// Validate the configuration and return any issues.
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.max_episode_steps == 0 {
            return Err("max_episode_steps must be > 0");
        }
        if self.memory_capacity == 0 {
            return Err("memory_capacity must be > 0");
        }
        if self.batch_size == 0 {
            return Err("batch_size must be > 0");
        }
        if self.batch_size > self.memory_capacity {
            return Err("batch_size must not exceed memory_capacity");
        }
        let in_range = |gamma: f64| gamma > 0.0 && gamma < 1.0;
        if !in_range(self.gamma.value(0, 0)) || !in_range(self.gamma.value(usize::MAX, 0)) {
            return Err("gamma must stay in (0, 1)");
        }
        Ok(())
    }
}

/// Twin-critic actor-critic configuration.
#[derive(Debug, Clone)]
pub struct ActorCriticConfig {
    /// Shared replay-learner settings.
    pub training: TrainingConfig,
    /// Actor learning rate.
    pub actor_lr: StepDecay,
    /// How target networks follow the live networks.
    pub target_sync: TargetSync,
    /// Std of the target-policy smoothing noise, in normalised action units.
    pub policy_noise: f32,
    /// Smoothing noise is clipped to `±noise_clip`.
    pub noise_clip: f32,
    /// Std of the exploration noise at ε = 1, in normalised action units.
    pub exploration_noise: f32,
    /// Actor (and actor target) update every N critic updates.
    pub actor_update_period: usize,
    /// Gradient-norm bound applied by both optimizers.
    pub max_grad_norm: Option<f32>,
    /// Checkpoint directory. `None` disables checkpointing.
    pub checkpoint_dir: Option<PathBuf>,
    /// Checkpoint every N updates.
    pub checkpoint_freq: usize,
}

impl Default for ActorCriticConfig {
    fn default() -> Self {
        Self {
            training: TrainingConfig::default(),
            actor_lr: StepDecay::new(1e-3, 1e-4, 1, 0.5),
            target_sync: TargetSync::Soft { tau: 0.01 },
            policy_noise: 0.2,
            noise_clip: 0.5,
            exploration_noise: 0.5,
            actor_update_period: 2,
            max_grad_norm: Some(1.0),
            checkpoint_dir: None,
            checkpoint_freq: 10_000,
        }
    }
}

impl ActorCriticConfig {
    /// Create config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the shared training settings.
    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    /// Set the actor learning-rate schedule.
    pub fn with_actor_lr(mut self, schedule: StepDecay) -> Self {
        self.actor_lr = schedule;
        self
    }

    /// Set the target synchronisation mode.
    pub fn with_target_sync(mut self, sync: TargetSync) -> Self {
        self.target_sync = sync;
        self
    }

    /// Set target-policy smoothing noise and its clip.
    pub fn with_policy_noise(mut self, std: f32, clip: f32) -> Self {
        self.policy_noise = std;
        self.noise_clip = clip;
        self
    }

    /// Set the exploration noise scale.
    pub fn with_exploration_noise(mut self, std: f32) -> Self {
        self.exploration_noise = std;
        self
    }

    /// Set the delayed actor update period.
    pub fn with_actor_update_period(mut self, period: usize) -> Self {
        self.actor_update_period = period;
        self
    }

    /// Set (or disable) gradient-norm clipping.
    pub fn with_max_grad_norm(mut self, max_norm: Option<f32>) -> Self {
        self.max_grad_norm = max_norm;
        self
    }

    /// Write checkpoints into `dir` every `freq` updates.
    pub fn with_checkpoints(mut self, dir: impl Into<PathBuf>, freq: usize) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self.checkpoint_freq = freq;
        self
    }

    /// Validate the configuration, including the shared settings.
    pub fn validate(&self) -> Result<()> {
        self.training
            .validate()
            .map_err(|e| SafetyRlError::InvalidConfig(e.to_string()))?;

        let check = |ok: bool, msg: &str| {
            if ok {
                Ok(())
            } else {
                Err(SafetyRlError::InvalidConfig(msg.to_string()))
            }
        };
        check(self.actor_update_period > 0, "actor_update_period must be > 0")?;
        check(self.checkpoint_freq > 0, "checkpoint_freq must be > 0")?;
        check(
            self.policy_noise.is_finite() && self.policy_noise >= 0.0,
            "policy_noise must be finite and >= 0",
        )?;
        check(
            self.noise_clip.is_finite() && self.noise_clip >= 0.0,
            "noise_clip must be finite and >= 0",
        )?;
        check(
            self.exploration_noise.is_finite() && self.exploration_noise >= 0.0,
            "exploration_noise must be finite and >= 0",
        )?;
        if let TargetSync::Soft { tau } = self.target_sync {
            check((0.0..=1.0).contains(&tau), "tau must lie in [0, 1]")?;
        }
        if let TargetSync::Hard { period } = self.target_sync {
            check(period > 0, "hard sync period must be > 0")?;
        }
        if let Some(max_norm) = self.max_grad_norm {
            check(max_norm > 0.0, "max_grad_norm must be > 0")?;
        }
        Ok(())
    }

    /// Create configured optimizers for the actor and the critic.
    ///
    /// Returns `(actor_optimizer, critic_optimizer)`.
    pub fn create_optimizers<B, Actor, Critic>(
        &self,
    ) -> (impl Optimizer<Actor, B>, impl Optimizer<Critic, B>)
    where
        B: AutodiffBackend,
        Actor: AutodiffModule<B>,
        Critic: AutodiffModule<B>,
    {
        let mut actor_config = AdamConfig::new().with_epsilon(1e-5);
        let mut critic_config = AdamConfig::new().with_epsilon(1e-5);

        if let Some(max_norm) = self.max_grad_norm {
            actor_config =
                actor_config.with_grad_clipping(Some(GradientClippingConfig::Norm(max_norm)));
            critic_config =
                critic_config.with_grad_clipping(Some(GradientClippingConfig::Norm(max_norm)));
        }

        (actor_config.init(), critic_config.init())
    }
}
