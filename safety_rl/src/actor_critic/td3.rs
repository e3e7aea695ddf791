//! Twin-critic deterministic actor-critic with SBE targets.
//!
//! The critic update regresses both heads onto
//!
//! ```text
//! y = (1-γ)·max(l, g) + γ·max(g', min(l', max(Q1', Q2')))
//! ```
//!
//! where `Q1', Q2'` are the target critics evaluated at the smoothed target
//! policy action. Terminal transitions regress onto `g'`. Taking the max of
//! the two heads keeps the bootstrap an upper bound on the reach-avoid cost.
//!
//! The actor minimises `Q_k(s, π(s))` for a head `k` drawn at random on
//! every actor update, and is updated once every `actor_update_period`
//! critic updates. Target networks follow through [`TargetSyncHook`] after
//! each optimizer step. A step is skipped when the loss or the global
//! gradient norm is not finite.

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use super::batch::{
    gradient_norm, sbe_td_targets, tensor_to_scalar, twin_critic_loss, TransitionBatch,
};
use super::config::ActorCriticConfig;
use super::networks::{DeterministicPolicy, TwinQ};
use crate::checkpoint::{Checkpointer, CheckpointerConfig};
use crate::core::replay_buffer::ReplayBuffer;
use crate::core::sbe::sbe_outcome;
use crate::core::target_network::{hard_copy, TargetSyncHook};
use crate::core::transition::Transition;
use crate::environment::ContinuousReachAvoidEnv;
use crate::error::{Result, SafetyRlError};
use crate::metrics::{MetricsLogger, TrainingSnapshot};
use crate::scheduling::Schedule;

/// Per-dimension action box.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionBounds {
    low: Vec<f32>,
    high: Vec<f32>,
}

impl ActionBounds {
    /// Build bounds, rejecting mismatched, empty, inverted or non-finite ones.
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> Result<Self> {
        if low.is_empty() || low.len() != high.len() {
            return Err(SafetyRlError::InvalidConfig(format!(
                "action bounds must be non-empty and of equal length, got {} and {}",
                low.len(),
                high.len()
            )));
        }
        let ordered = low
            .iter()
            .zip(&high)
            .all(|(lo, hi)| lo.is_finite() && hi.is_finite() && lo <= hi);
        if !ordered {
            return Err(SafetyRlError::InvalidConfig(
                "action bounds must be finite with low <= high".into(),
            ));
        }
        Ok(Self { low, high })
    }

    /// Read the bounds from an environment.
    pub fn from_env<E: ContinuousReachAvoidEnv + ?Sized>(env: &E) -> Result<Self> {
        Self::new(env.action_low(), env.action_high())
    }

    /// Action dimension.
    pub fn dim(&self) -> usize {
        self.low.len()
    }

    pub fn low(&self) -> &[f32] {
        &self.low
    }

    pub fn high(&self) -> &[f32] {
        &self.high
    }

    /// Map `[-1, 1]` actions to the box.
    pub fn scale(&self, normalized: &[f32]) -> Vec<f32> {
        normalized
            .iter()
            .zip(self.low.iter().zip(&self.high))
            .map(|(u, (lo, hi))| lo + (u.clamp(-1.0, 1.0) + 1.0) * 0.5 * (hi - lo))
            .collect()
    }

    /// Tensor form of [`ActionBounds::scale`] for `[batch, dim]` inputs.
    pub fn scale_tensor<B: Backend>(&self, normalized: Tensor<B, 2>, device: &B::Device) -> Tensor<B, 2> {
        let span: Vec<f32> = self.low.iter().zip(&self.high).map(|(lo, hi)| hi - lo).collect();
        let low = Tensor::<B, 1>::from_floats(self.low.as_slice(), device).unsqueeze_dim::<2>(0);
        let span = Tensor::<B, 1>::from_floats(span.as_slice(), device).unsqueeze_dim::<2>(0);
        normalized.add_scalar(1.0).mul_scalar(0.5) * span + low
    }

    /// Uniform sample from the box.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f32> {
        self.low
            .iter()
            .zip(&self.high)
            .map(|(&lo, &hi)| if lo < hi { rng.gen_range(lo..hi) } else { lo })
            .collect()
    }
}

/// Losses from one call to [`SbeTd3::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateLosses {
    pub critic: f32,
    /// `None` when the actor update was delayed.
    pub actor: Option<f32>,
}

/// Losses collected by [`SbeTd3::learn`].
#[derive(Debug, Clone, Default)]
pub struct TrainingLosses {
    pub critic: Vec<f32>,
    pub actor: Vec<f32>,
    /// Updates dropped because a loss was not finite.
    pub skipped_updates: usize,
    /// Completed (terminated or truncated) episodes.
    pub episodes: usize,
}

/// Twin-critic actor-critic learner.
///
/// `C` and `P` are the critic and policy networks, `CO` and `PO` their
/// optimizers (see [`ActorCriticConfig::create_optimizers`]).
pub struct SbeTd3<B: AutodiffBackend, C, P, CO, PO> {
    critic: C,
    critic_target: C,
    actor: P,
    actor_target: P,
    critic_optimizer: CO,
    actor_optimizer: PO,
    critic_sync: TargetSyncHook,
    actor_sync: TargetSyncHook,
    memory: ReplayBuffer<Transition>,
    bounds: ActionBounds,
    state_dim: usize,
    config: ActorCriticConfig,
    rng: StdRng,
    device: B::Device,
    updates: usize,
    checkpointer: Option<Checkpointer>,
    logger: Option<Box<dyn MetricsLogger>>,
}

impl<B, C, P, CO, PO> SbeTd3<B, C, P, CO, PO>
where
    B: AutodiffBackend,
    C: TwinQ<B> + AutodiffModule<B>,
    P: DeterministicPolicy<B> + AutodiffModule<B>,
    P::InnerModule: DeterministicPolicy<B::InnerBackend>,
    CO: Optimizer<C, B>,
    PO: Optimizer<P, B>,
{
    /// Create a learner. Target networks start as copies of `critic` and
    /// `actor`.
    ///
    /// `optimizers` is `(actor_optimizer, critic_optimizer)`, the order
    /// returned by [`ActorCriticConfig::create_optimizers`].
    pub fn new(
        critic: C,
        actor: P,
        optimizers: (PO, CO),
        state_dim: usize,
        bounds: ActionBounds,
        config: ActorCriticConfig,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;
        if state_dim == 0 {
            return Err(SafetyRlError::InvalidConfig("state_dim must be > 0".into()));
        }
        if actor.action_dim() != bounds.dim() {
            return Err(SafetyRlError::InvalidConfig(format!(
                "policy action_dim {} does not match action bounds of dimension {}",
                actor.action_dim(),
                bounds.dim()
            )));
        }

        let checkpointer = match &config.checkpoint_dir {
            Some(dir) => Some(Checkpointer::new(
                CheckpointerConfig::new(dir)
                    .with_save_interval(config.checkpoint_freq)
                    .with_max_models(config.training.max_models),
            )?),
            None => None,
        };

        let (actor_optimizer, critic_optimizer) = optimizers;
        Ok(Self {
            critic_target: hard_copy::<B, _>(&critic),
            actor_target: hard_copy::<B, _>(&actor),
            critic,
            actor,
            critic_optimizer,
            actor_optimizer,
            critic_sync: TargetSyncHook::new(config.target_sync),
            actor_sync: TargetSyncHook::new(config.target_sync),
            memory: ReplayBuffer::new(config.training.memory_capacity)?,
            bounds,
            state_dim,
            rng: StdRng::seed_from_u64(config.training.seed),
            config,
            device,
            updates: 0,
            checkpointer,
            logger: None,
        })
    }

    /// Emit one snapshot per finished episode to `logger`.
    pub fn with_logger(mut self, logger: impl MetricsLogger + 'static) -> Self {
        self.logger = Some(Box::new(logger));
        self
    }

    pub fn critic(&self) -> &C {
        &self.critic
    }

    pub fn critic_target(&self) -> &C {
        &self.critic_target
    }

    pub fn actor(&self) -> &P {
        &self.actor
    }

    pub fn actor_target(&self) -> &P {
        &self.actor_target
    }

    pub fn memory(&self) -> &ReplayBuffer<Transition> {
        &self.memory
    }

    pub fn bounds(&self) -> &ActionBounds {
        &self.bounds
    }

    pub fn config(&self) -> &ActorCriticConfig {
        &self.config
    }

    pub fn checkpointer(&self) -> Option<&Checkpointer> {
        self.checkpointer.as_ref()
    }

    /// Number of critic updates performed (including skipped ones).
    pub fn updates(&self) -> usize {
        self.updates
    }

    /// Current exploration scale.
    pub fn epsilon(&self) -> f64 {
        self.config.training.epsilon.value(self.updates, 0)
    }

    /// Current discount.
    pub fn gamma(&self) -> f64 {
        self.config.training.gamma.value(self.updates, 0)
    }

    /// Current critic learning rate.
    pub fn critic_lr(&self) -> f64 {
        self.config.training.critic_lr.value(self.updates, 0)
    }

    /// Current actor learning rate.
    pub fn actor_lr(&self) -> f64 {
        self.config.actor_lr.value(self.updates, 0)
    }

    /// Add a transition to the replay buffer.
    pub fn store_transition(&mut self, transition: Transition) {
        self.memory.push(transition);
    }

    /// Uniform random action inside the bounds.
    pub fn random_action(&mut self) -> Vec<f32> {
        self.bounds.sample(&mut self.rng)
    }

    /// Policy action for one state, with Gaussian exploration noise of std
    /// `ε · exploration_noise` when `explore` is set.
    pub fn select_action(&mut self, state: &[f32], explore: bool) -> Result<Vec<f32>> {
        if state.len() != self.state_dim {
            return Err(SafetyRlError::BatchMismatch {
                field: "state",
                expected: self.state_dim,
                found: state.len(),
            });
        }

        let actor = self.actor.valid();
        let input = Tensor::<B::InnerBackend, 1>::from_floats(state, &self.device)
            .reshape([1, self.state_dim]);
        let mut action: Vec<f32> = actor.forward(input).into_data().iter::<f32>().collect();

        if explore {
            let std = self.epsilon() as f32 * self.config.exploration_noise;
            let noise = self.gaussian(action.len(), std)?;
            for (a, n) in action.iter_mut().zip(noise) {
                *a = (*a + n).clamp(-1.0, 1.0);
            }
        }
        Ok(self.bounds.scale(&action))
    }

    /// Fill the replay buffer to `ratio` of its capacity with uniformly
    /// random actions.
    ///
    /// Terminal steps are stored without a next state and reset the
    /// environment. Returns the number of environment steps taken.
    pub fn init_buffer<E: ContinuousReachAvoidEnv + ?Sized>(
        &mut self,
        env: &mut E,
        ratio: f64,
    ) -> Result<usize> {
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(SafetyRlError::InvalidConfig(format!(
                "buffer warmup ratio must lie in (0, 1], got {}",
                ratio
            )));
        }
        let capacity = self.memory.capacity();
        let target = ((capacity as f64 * ratio).ceil() as usize).clamp(1, capacity);
        let max_steps = self.config.training.max_episode_steps;

        let mut state = env.reset();
        let mut steps = 0;
        let mut episode_steps = 0;
        while self.memory.len() < target {
            let action = self.random_action();
            let outcome = env.step(&action)?;
            steps += 1;
            episode_steps += 1;

            let next_state = (!outcome.done).then(|| outcome.next_state.clone());
            self.memory.push(Transition::new_continuous(
                state,
                action,
                outcome.reward,
                next_state,
                outcome.margins,
            ));

            if outcome.done || episode_steps >= max_steps {
                state = env.reset();
                episode_steps = 0;
            } else {
                state = outcome.next_state;
            }
        }

        log::info!("replay buffer warmed up: {} transitions from {} steps", self.memory.len(), steps);
        Ok(steps)
    }

    /// Regress both critic heads onto `values` at `states` (random actions,
    /// redrawn every iteration), then hard-copy the critic into its target.
    ///
    /// Returns the loss of every iteration.
    pub fn warmup_critic(
        &mut self,
        states: &[Vec<f32>],
        values: &[f32],
        iterations: usize,
    ) -> Result<Vec<f32>> {
        if states.is_empty() {
            return Err(SafetyRlError::BatchMismatch {
                field: "states",
                expected: 1,
                found: 0,
            });
        }
        if values.len() != states.len() {
            return Err(SafetyRlError::BatchMismatch {
                field: "values",
                expected: states.len(),
                found: values.len(),
            });
        }
        if let Some(s) = states.iter().find(|s| s.len() != self.state_dim) {
            return Err(SafetyRlError::BatchMismatch {
                field: "state",
                expected: self.state_dim,
                found: s.len(),
            });
        }

        let n = states.len();
        let action_dim = self.bounds.dim();
        let flat: Vec<f32> = states.iter().flatten().copied().collect();
        let state_tensor =
            Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device).reshape([n, self.state_dim]);
        let value_tensor = Tensor::<B, 1>::from_floats(values, &self.device);
        let lr = self.critic_lr();

        let mut losses = Vec::with_capacity(iterations);
        for _ in 0..iterations {
            let actions: Vec<f32> = (0..n)
                .flat_map(|_| self.bounds.sample(&mut self.rng))
                .collect();
            let action_tensor = Tensor::<B, 1>::from_floats(actions.as_slice(), &self.device)
                .reshape([n, action_dim]);

            let (q1, q2) = self.critic.forward(state_tensor.clone(), action_tensor);
            let loss = twin_critic_loss(q1, q2, value_tensor.clone());
            losses.push(self.apply_critic_step(loss, lr)?);
        }

        self.critic_target = hard_copy::<B, _>(&self.critic);
        log::info!(
            "critic warmup done after {} iterations, final loss {:?}",
            iterations,
            losses.last()
        );
        Ok(losses)
    }

    /// One learning step: a critic update and, every `actor_update_period`
    /// steps, an actor update.
    ///
    /// Returns `Ok(None)` while the buffer holds fewer than `batch_size`
    /// transitions. A non-finite loss returns
    /// [`SafetyRlError::NonFiniteLoss`]; the step still counts towards the
    /// schedules but no parameters change.
    pub fn update(&mut self) -> Result<Option<UpdateLosses>> {
        let batch_size = self.config.training.batch_size;
        let Some(sample) = self.memory.sample(batch_size, &mut self.rng) else {
            return Ok(None);
        };
        let batch = TransitionBatch::<B>::from_transitions(
            &sample,
            self.state_dim,
            self.bounds.dim(),
            &self.device,
        )?;

        let gamma = self.gamma() as f32;
        let critic_lr = self.critic_lr();
        let actor_lr = self.actor_lr();
        self.updates += 1;

        let critic = self.update_critic(&batch, gamma, critic_lr)?;
        let actor = if self.updates % self.config.actor_update_period == 0 {
            Some(self.update_actor(batch.states, actor_lr)?)
        } else {
            None
        };

        Ok(Some(UpdateLosses { critic, actor }))
    }

    /// Critic step towards the SBE targets of `batch`.
    pub fn update_critic(&mut self, batch: &TransitionBatch<B>, gamma: f32, lr: f64) -> Result<f32> {
        let next_actions = self.target_actions(batch.next_states.clone())?;
        let (next_q1, next_q2) = self
            .critic_target
            .forward(batch.next_states.clone(), next_actions);
        let q_max = next_q1.max_pair(next_q2).detach();
        let targets = sbe_td_targets(batch, q_max, gamma).detach();

        let (q1, q2) = self
            .critic
            .forward(batch.states.clone(), batch.actions.clone());
        let loss = twin_critic_loss(q1, q2, targets);
        let value = self.apply_critic_step(loss, lr)?;

        self.critic_target = self
            .critic_sync
            .after_step::<B, _>(&self.critic, self.critic_target.clone());
        Ok(value)
    }

    /// Actor step minimising the mean of a randomly chosen critic head.
    pub fn update_actor(&mut self, states: Tensor<B, 2>, lr: f64) -> Result<f32> {
        let actions = self
            .bounds
            .scale_tensor(self.actor.forward(states.clone()), &self.device);
        let (q1, q2) = self.critic.forward(states, actions);
        let q = if self.rng.gen_bool(0.5) { q1 } else { q2 };

        let loss = q.mean();
        let value = tensor_to_scalar(&loss);
        if !value.is_finite() {
            log::warn!("actor loss is {}, skipping update {}", value, self.updates);
            return Err(SafetyRlError::NonFiniteLoss {
                network: "actor",
                value,
            });
        }

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.actor);
        let norm = gradient_norm::<B, _>(&self.actor, &grads);
        if !norm.is_finite() {
            log::warn!("actor gradient norm is {}, skipping update {}", norm, self.updates);
            return Err(SafetyRlError::NonFiniteLoss {
                network: "actor",
                value: norm,
            });
        }
        self.actor = self.actor_optimizer.step(lr, self.actor.clone(), grads);

        self.actor_target = self
            .actor_sync
            .after_step::<B, _>(&self.actor, self.actor_target.clone());
        Ok(value)
    }

    /// Off-policy training loop.
    ///
    /// Runs until [`SbeTd3::updates`] reaches `max_updates`. Episodes are
    /// truncated at `max_episode_steps`; truncated steps keep their next state.
    /// Updates skipped for a non-finite loss are counted and training goes on.
    pub fn learn<E: ContinuousReachAvoidEnv + ?Sized>(&mut self, env: &mut E) -> Result<TrainingLosses> {
        let max_updates = self.config.training.max_updates;
        let max_steps = self.config.training.max_episode_steps;
        let mut losses = TrainingLosses::default();
        let mut rewards = Vec::new();
        let mut env_steps = 0u64;
        let mut state = env.reset();

        while self.updates < max_updates {
            let action = self.select_action(&state, true)?;
            let outcome = env.step(&action)?;
            env_steps += 1;
            rewards.push(outcome.reward);

            let next_state = (!outcome.done).then(|| outcome.next_state.clone());
            self.store_transition(Transition::new_continuous(
                state,
                action,
                outcome.reward,
                next_state,
                outcome.margins,
            ));

            if outcome.done || rewards.len() >= max_steps {
                losses.episodes += 1;
                self.log_episode(&rewards, env_steps, &losses);
                rewards.clear();
                state = env.reset();
            } else {
                state = outcome.next_state;
            }

            let updated = match self.update() {
                Ok(Some(step)) => {
                    losses.critic.push(step.critic);
                    losses.actor.extend(step.actor);
                    true
                }
                Ok(None) => false,
                Err(SafetyRlError::NonFiniteLoss { .. }) => {
                    losses.skipped_updates += 1;
                    true
                }
                Err(e) => return Err(e),
            };

            let due = updated
                && self
                    .checkpointer
                    .as_ref()
                    .map(|c| c.should_save(self.updates))
                    .unwrap_or(false);
            if due {
                self.save_models()?;
                log::info!(
                    "update {}: checkpoint saved, ε={:.3} γ={:.6}",
                    self.updates,
                    self.epsilon(),
                    self.gamma()
                );
            }
        }

        if let Some(logger) = self.logger.as_mut() {
            logger.flush();
        }
        Ok(losses)
    }

    /// Save actor and critic checkpoints at the current update count.
    pub fn save_models(&mut self) -> Result<()> {
        let step = self.updates;
        let checkpointer = self
            .checkpointer
            .as_mut()
            .ok_or_else(|| SafetyRlError::InvalidConfig("checkpointing is disabled".into()))?;
        checkpointer.save::<B, _>("critic", &self.critic, step)?;
        checkpointer.save::<B, _>("actor", &self.actor, step)?;
        Ok(())
    }

    /// Restore the latest saved actor and critic, resetting both targets to
    /// them. Returns the step they were saved at.
    pub fn restore_latest(&mut self) -> Result<usize> {
        let checkpointer = self
            .checkpointer
            .as_ref()
            .ok_or_else(|| SafetyRlError::InvalidConfig("checkpointing is disabled".into()))?;
        let (critic, step) =
            checkpointer.load_latest::<B, _>("critic", self.critic.clone(), &self.device)?;
        let (actor, _) = checkpointer.load_latest::<B, _>("actor", self.actor.clone(), &self.device)?;

        self.critic_target = hard_copy::<B, _>(&critic);
        self.actor_target = hard_copy::<B, _>(&actor);
        self.critic = critic;
        self.actor = actor;
        Ok(step)
    }

    /// Target-policy action at `next_states` with clipped smoothing noise,
    /// scaled to the action bounds.
    fn target_actions(&mut self, next_states: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let normalized = self.actor_target.forward(next_states).detach();
        let [n, d] = normalized.dims();

        let normalized = if self.config.policy_noise > 0.0 {
            let clip = self.config.noise_clip;
            let noise: Vec<f32> = self
                .gaussian(n * d, self.config.policy_noise)?
                .into_iter()
                .map(|x| x.clamp(-clip, clip))
                .collect();
            let noise = Tensor::<B, 1>::from_floats(noise.as_slice(), &self.device).reshape([n, d]);
            (normalized + noise).clamp(-1.0, 1.0)
        } else {
            normalized
        };

        Ok(self.bounds.scale_tensor(normalized, &self.device))
    }

    fn apply_critic_step(&mut self, loss: Tensor<B, 1>, lr: f64) -> Result<f32> {
        let value = tensor_to_scalar(&loss);
        if !value.is_finite() {
            log::warn!("critic loss is {}, skipping update {}", value, self.updates);
            return Err(SafetyRlError::NonFiniteLoss {
                network: "critic",
                value,
            });
        }

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.critic);
        let norm = gradient_norm::<B, _>(&self.critic, &grads);
        if !norm.is_finite() {
            log::warn!("critic gradient norm is {}, skipping update {}", norm, self.updates);
            return Err(SafetyRlError::NonFiniteLoss {
                network: "critic",
                value: norm,
            });
        }
        self.critic = self.critic_optimizer.step(lr, self.critic.clone(), grads);
        Ok(value)
    }

    fn gaussian(&mut self, n: usize, std: f32) -> Result<Vec<f32>> {
        if n == 0 || std <= 0.0 {
            return Ok(vec![0.0; n]);
        }
        let normal = Normal::new(0.0f32, std)
            .map_err(|e| SafetyRlError::InvalidConfig(format!("noise std {}: {}", std, e)))?;
        Ok((0..n).map(|_| normal.sample(&mut self.rng)).collect())
    }

    fn log_episode(&mut self, rewards: &[f32], env_steps: u64, losses: &TrainingLosses) {
        let gamma = self.gamma();
        let avg_reward = rewards.iter().sum::<f32>() / rewards.len().max(1) as f32;
        let outcome = sbe_outcome(rewards, gamma as f32)
            .first()
            .copied()
            .unwrap_or(f32::NAN);
        log::debug!(
            "episode {} ({} steps): outcome {:.4}, avg reward {:.4}",
            losses.episodes,
            rewards.len(),
            outcome,
            avg_reward
        );

        let (critic_lr, epsilon) = (self.critic_lr(), self.epsilon());
        if let Some(logger) = self.logger.as_mut() {
            let mut snapshot = TrainingSnapshot::new(self.updates, env_steps, avg_reward, outcome)
                .with_schedules(critic_lr, epsilon, gamma);
            if let Some(&critic) = losses.critic.last() {
                snapshot = snapshot.with_losses(critic, losses.actor.last().copied());
            }
            logger.log(&snapshot);
        }
    }
}
