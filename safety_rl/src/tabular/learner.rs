//! Tabular Q-learning with the Safety Bellman Equation.
//!
//! The learner owns its environment, value table, RNG and statistics. One
//! call to [`TabularLearner::train`] runs `max_episodes` episodes
//! synchronously:
//!
//! 1. Reset the environment and map the state to its grid cell.
//! 2. Pick an ε-greedy action (`argmin` over the cost-to-go row).
//! 3. Step, count the visit, evaluate α and γ at the new visit count.
//! 4. Apply the backup `Q ← (1-α)·Q + α·target`.
//! 5. Stop on `done` or at the episode cap, then record statistics.
//!
//! Every `eval_freq` episodes the value function is compared against a
//! ground-truth grid when one is supplied.

use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::ArrayD;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::{TabularConfig, TabularSchedules, DEFAULT_EPISODE_STEP_CAP};
use super::evaluation::PolicyComparison;
use super::grid::Grid;
use super::q_table::QTable;
use super::stats::{EpisodeSummary, ScheduleValues, TrainingStats};
use crate::core::transition::Transition;
use crate::environment::ReachAvoidEnv;
use crate::error::{Result, SafetyRlError};
use crate::metrics::{MetricsLogger, TrainingSnapshot};

/// ε-greedy action selection over a cost-to-go table.
///
/// With probability `epsilon` a uniformly random action, otherwise the
/// action with the lowest `Q(s, a)`.
pub fn select_action<R: Rng + ?Sized>(
    table: &QTable,
    index: &[usize],
    epsilon: f64,
    rng: &mut R,
) -> usize {
    if rng.gen::<f64>() < epsilon {
        rng.gen_range(0..table.n_actions())
    } else {
        table.greedy_action(index)
    }
}

/// Raw result of one training episode.
#[derive(Debug, Clone)]
pub struct EpisodeRollout {
    /// Reward of every step, in order.
    pub rewards: Vec<f32>,
    /// Steps whose next state fell in the same cell.
    pub redundant_steps: u64,
    /// Schedule values after the last update.
    pub schedule: ScheduleValues,
}

/// Path of the table checkpoint for `episode`.
pub fn model_path(out_dir: &Path, episode: usize) -> PathBuf {
    out_dir.join("model").join(format!("{}.json", episode))
}

/// Path of the statistics record.
pub fn stats_path(out_dir: &Path) -> PathBuf {
    out_dir.join("stats.json")
}

/// Tabular SBE Q-learner.
pub struct TabularLearner<E: ReachAvoidEnv> {
    env: E,
    grid: Grid,
    table: QTable,
    config: TabularConfig,
    schedules: TabularSchedules,
    rng: StdRng,
    stats: TrainingStats,
    ground_truth: Option<ArrayD<f32>>,
    evaluations: Vec<(usize, PolicyComparison)>,
    logger: Option<Box<dyn MetricsLogger>>,
}

impl<E: ReachAvoidEnv> TabularLearner<E> {
    /// Start from the boundary condition `Q(s, a) = max(l(s), g(s))`.
    ///
    /// `start_episode` is rejected here; it only makes sense for warm starts.
    pub fn new(
        env: E,
        grid: Grid,
        schedules: TabularSchedules,
        config: TabularConfig,
    ) -> Result<Self> {
        if config.start_episode.is_some() {
            return Err(SafetyRlError::InvalidConfig(
                "start_episode is only used with a warm-started table".into(),
            ));
        }
        let table = QTable::initialize(&grid, env.n_actions(), &env);
        Self::build(env, grid, table, schedules, config)
    }

    /// Continue from a table produced by an earlier run.
    ///
    /// The table must have shape `grid cells + [n_actions]`.
    pub fn warm_start(
        env: E,
        grid: Grid,
        values: ArrayD<f32>,
        schedules: TabularSchedules,
        config: TabularConfig,
    ) -> Result<Self> {
        let table = QTable::from_warm_start(values, &grid, env.n_actions())?;
        if config.start_episode.is_none() {
            log::warn!(
                "warm start without start_episode, schedules restart from episode 1"
            );
        }
        Self::build(env, grid, table, schedules, config)
    }

    fn build(
        env: E,
        grid: Grid,
        table: QTable,
        schedules: TabularSchedules,
        config: TabularConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SafetyRlError::InvalidConfig(e.into()))?;
        if env.n_actions() == 0 {
            return Err(SafetyRlError::InvalidConfig(
                "environment has no actions".into(),
            ));
        }
        if env.state_dim() != grid.ndim() {
            return Err(SafetyRlError::InvalidConfig(format!(
                "state dimension {} does not match grid dimension {}",
                env.state_dim(),
                grid.ndim()
            )));
        }

        let stats = TrainingStats::new(
            config.max_episodes,
            grid.cells().to_vec(),
            grid.bounds().to_vec(),
            config.seed,
        );
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            env,
            grid,
            table,
            config,
            schedules,
            stats,
            ground_truth: None,
            evaluations: Vec::new(),
            logger: None,
        })
    }

    /// Enable periodic evaluation against a ground-truth value grid.
    pub fn with_ground_truth(mut self, values: ArrayD<f32>) -> Result<Self> {
        if values.shape() != self.grid.cells() {
            return Err(SafetyRlError::ShapeMismatch {
                expected: self.grid.cells().to_vec(),
                found: values.shape().to_vec(),
            });
        }
        self.ground_truth = Some(values);
        Ok(self)
    }

    /// Emit one snapshot per episode to `logger`.
    pub fn with_logger(mut self, logger: impl MetricsLogger + 'static) -> Self {
        self.logger = Some(Box::new(logger));
        self
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    pub fn config(&self) -> &TabularConfig {
        &self.config
    }

    /// Evaluations recorded so far, keyed by episode count.
    pub fn evaluations(&self) -> &[(usize, PolicyComparison)] {
        &self.evaluations
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    /// Consume the learner, returning the table and statistics.
    pub fn into_parts(self) -> (QTable, TrainingStats) {
        (self.table, self.stats)
    }

    /// ε-greedy action at cell `index` using the learner's RNG.
    pub fn select_action(&mut self, index: &[usize], epsilon: f64) -> usize {
        select_action(&self.table, index, epsilon, &mut self.rng)
    }

    /// Apply one backup to the table and count the visit.
    ///
    /// Terminal transitions (no next state) back up `g_x_nxt` under the SBE
    /// rule. Returns the updated `Q(s, a)`.
    pub fn step_update(&mut self, transition: &Transition, alpha: f64, gamma: f64) -> Result<f32> {
        if !alpha.is_finite() || !gamma.is_finite() {
            return Err(SafetyRlError::InvalidConfig(format!(
                "non-finite schedule value (alpha {}, gamma {})",
                alpha, gamma
            )));
        }
        let action = transition.action.discrete().ok_or_else(|| {
            SafetyRlError::InvalidConfig("tabular updates need a discrete action".into())
        })?;
        if action >= self.table.n_actions() {
            return Err(SafetyRlError::InvalidConfig(format!(
                "action {} out of range for {} actions",
                action,
                self.table.n_actions()
            )));
        }

        let index = self.grid.state_to_index(&transition.state);
        let next_q: Option<Vec<f32>> = transition.next_state.as_ref().map(|s| {
            let next_index = self.grid.state_to_index(s);
            self.table.row(&next_index).iter().copied().collect()
        });
        let target = self.config.backup.target(
            transition.reward,
            &transition.margins,
            next_q.as_deref(),
            gamma as f32,
        );

        self.table.record_visit(&index, action);
        Ok(self.table.blend(&index, action, target, alpha as f32))
    }

    /// Schedules are indexed from 1 unless a warm start supplies an offset.
    fn schedule_step(&self, episode: usize) -> usize {
        episode + self.config.start_episode.unwrap_or(1)
    }

    /// Run one learning episode of at most `max_length` steps.
    pub fn run_episode(&mut self, episode: usize, max_length: usize) -> Result<EpisodeRollout> {
        let step = self.schedule_step(episode);
        let epsilon = self.schedules.epsilon.value(step, 0);
        let mut alpha = self.schedules.learning_rate.value(step, 0);
        let mut gamma = self.schedules.gamma.value(step, 0);

        let mut state = self.env.reset();
        let mut rewards = Vec::with_capacity(max_length.min(4096));
        let mut redundant_steps = 0;

        for _ in 0..max_length {
            let index = self.grid.state_to_index(&state);
            let action = self.select_action(&index, epsilon);
            let outcome = self.env.step(action)?;

            if self.grid.state_to_index(&outcome.next_state) == index {
                redundant_steps += 1;
            }

            // schedules see the count including this visit
            let visits = self.table.visit_count(&index, action) + 1;
            alpha = self.schedules.learning_rate.value(step, visits);
            gamma = self.schedules.gamma.value(step, visits);

            let next_state = (!outcome.done).then(|| outcome.next_state.clone());
            let transition =
                Transition::new_discrete(state, action, outcome.reward, next_state, outcome.margins);
            self.step_update(&transition, alpha, gamma)?;
            rewards.push(outcome.reward);

            if outcome.done {
                break;
            }
            state = outcome.next_state;
        }

        Ok(EpisodeRollout {
            rewards,
            redundant_steps,
            schedule: ScheduleValues {
                learning_rate: alpha,
                epsilon,
                gamma,
            },
        })
    }

    /// Train for `max_episodes` episodes.
    pub fn train(&mut self) -> Result<&TrainingStats> {
        if self.config.max_episode_length.is_none() {
            log::warn!(
                "max_episode_length is not set, capping episodes at {} steps",
                DEFAULT_EPISODE_STEP_CAP
            );
        }

        let start = Instant::now();
        let cap = self.config.episode_step_cap();
        let eval_freq = self.config.effective_eval_freq();

        for episode in 0..self.config.max_episodes {
            let rollout = self.run_episode(episode, cap)?;
            self.stats.total_steps += rollout.rewards.len() as u64;
            self.stats.redundant_steps += rollout.redundant_steps;

            match EpisodeSummary::from_rewards(&rollout.rewards, rollout.schedule.gamma as f32) {
                Ok(summary) => {
                    self.stats.record(episode, &summary, &rollout.schedule)?;
                    if let Some(logger) = self.logger.as_mut() {
                        let snapshot = TrainingSnapshot::new(
                            episode,
                            self.stats.total_steps,
                            summary.average_reward,
                            summary.outcome,
                        )
                        .with_schedules(
                            rollout.schedule.learning_rate,
                            rollout.schedule.epsilon,
                            rollout.schedule.gamma,
                        );
                        logger.log(&snapshot);
                    }
                }
                Err(e) => log::warn!("episode {}: {}", episode, e),
            }

            if (episode + 1) % self.config.progress_freq == 0 {
                log::info!(
                    "episode {}/{} alpha:{:.4} gamma:{:.6} epsilon:{:.4} redund:{:.4}",
                    episode + 1,
                    self.config.max_episodes,
                    rollout.schedule.learning_rate,
                    rollout.schedule.gamma,
                    rollout.schedule.epsilon,
                    self.stats.redundancy()
                );
            }

            if (episode + 1) % eval_freq == 0 {
                self.evaluate(episode + 1)?;
            }

            if let Some(freq) = self.config.save_freq {
                if episode % freq == 0 {
                    self.save(episode)?;
                }
            }
        }

        self.stats.time_elapsed = start.elapsed().as_secs_f64();
        if let Some(logger) = self.logger.as_mut() {
            logger.flush();
        }
        if let Some(dir) = &self.config.out_dir {
            self.stats.save(&stats_path(dir))?;
        }
        Ok(&self.stats)
    }

    /// Compare the current value function against the ground truth.
    ///
    /// Checkpoints the table under `model/<episode>.json` when an output
    /// directory is configured. Returns `None` without ground truth.
    pub fn evaluate(&mut self, episode: usize) -> Result<Option<PolicyComparison>> {
        let Some(truth) = self.ground_truth.as_ref() else {
            return Ok(None);
        };
        if let Some(dir) = &self.config.out_dir {
            self.table.save(&model_path(dir, episode))?;
        }

        let comparison = PolicyComparison::compare(&self.table.value_function(), truth)?;
        log::info!(
            "episode {}: agreement {:.3} false_safe {:.3} false_unsafe {:.3}",
            episode,
            comparison.agreement,
            comparison.false_safe,
            comparison.false_unsafe
        );
        self.evaluations.push((episode, comparison));
        Ok(Some(comparison))
    }

    /// Save the table as `model/<episode>.json` and the statistics record.
    ///
    /// No-op without an output directory.
    pub fn save(&self, episode: usize) -> Result<()> {
        let Some(dir) = &self.config.out_dir else {
            return Ok(());
        };
        self.table.save(&model_path(dir, episode))?;
        self.stats.save(&stats_path(dir))
    }

    /// Greedy rollouts without learning. Returns each episode's length.
    pub fn play(&mut self, episodes: usize, max_length: usize) -> Result<Vec<usize>> {
        let mut lengths = Vec::with_capacity(episodes);
        for i in 0..episodes {
            let mut state = self.env.reset();
            let mut t = 0;
            while t < max_length {
                let index = self.grid.state_to_index(&state);
                let action = self.table.greedy_action(&index);
                let outcome = self.env.step(action)?;
                t += 1;
                if outcome.done {
                    break;
                }
                state = outcome.next_state;
            }
            log::debug!("episode {} lasted {} timesteps", i, t);
            lengths.push(t);
        }
        Ok(lengths)
    }
}
