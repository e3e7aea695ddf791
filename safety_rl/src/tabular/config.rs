//! Configuration for tabular SBE Q-learning.

use std::path::PathBuf;

use crate::core::sbe::BackupRule;
use crate::scheduling::{Constant, Schedule};

/// Step cap applied when no maximum episode length is configured.
pub const DEFAULT_EPISODE_STEP_CAP: usize = 120;

/// Tabular learner configuration.
#[derive(Debug, Clone)]
pub struct TabularConfig {
    /// Number of training episodes (also the statistics capacity).
    pub max_episodes: usize,
    /// Maximum steps per episode. `None` falls back to
    /// [`DEFAULT_EPISODE_STEP_CAP`] with a warning.
    pub max_episode_length: Option<usize>,
    /// Schedule offset for a warm-started run. Fresh runs use 1.
    pub start_episode: Option<usize>,
    /// Seed for the learner's RNG.
    pub seed: u64,
    /// Bellman backup to apply.
    pub backup: BackupRule,
    /// Save table and statistics every N episodes (requires `out_dir`).
    pub save_freq: Option<usize>,
    /// Output directory for `model/<episode>.json` and `stats.json`.
    pub out_dir: Option<PathBuf>,
    /// Evaluate against ground truth every N episodes. Defaults to
    /// `max_episodes / 20`.
    pub eval_freq: Option<usize>,
    /// Log progress through `log::info!` every N episodes.
    pub progress_freq: usize,
}

impl Default for TabularConfig {
    fn default() -> Self {
        Self {
            max_episodes: 10_000,
            max_episode_length: None,
            start_episode: None,
            seed: 0,
            backup: BackupRule::Sbe,
            save_freq: None,
            out_dir: None,
            eval_freq: None,
            progress_freq: 1000,
        }
    }
}

impl TabularConfig {
    /// Create config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of training episodes.
    pub fn with_max_episodes(mut self, n: usize) -> Self {
        self.max_episodes = n;
        self
    }

    /// Set the maximum episode length.
    pub fn with_max_episode_length(mut self, n: usize) -> Self {
        self.max_episode_length = Some(n);
        self
    }

    /// Set the schedule offset for warm starts.
    pub fn with_start_episode(mut self, episode: usize) -> Self {
        self.start_episode = Some(episode);
        self
    }

    /// Set the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the backup rule.
    pub fn with_backup(mut self, backup: BackupRule) -> Self {
        self.backup = backup;
        self
    }

    /// Save every `freq` episodes into `out_dir`.
    pub fn with_output(mut self, out_dir: impl Into<PathBuf>, save_freq: usize) -> Self {
        self.out_dir = Some(out_dir.into());
        self.save_freq = Some(save_freq);
        self
    }

    /// Set the evaluation period.
    pub fn with_eval_freq(mut self, freq: usize) -> Self {
        self.eval_freq = Some(freq);
        self
    }

    /// Set the progress logging period.
    pub fn with_progress_freq(mut self, freq: usize) -> Self {
        self.progress_freq = freq;
        self
    }

    /// Episode cap used by the training loop.
    pub fn episode_step_cap(&self) -> usize {
        self.max_episode_length.unwrap_or(DEFAULT_EPISODE_STEP_CAP)
    }

    /// Evaluation period used by the training loop.
    pub fn effective_eval_freq(&self) -> usize {
        self.eval_freq.unwrap_or(self.max_episodes / 20).max(1)
    }

    /// Validate the configuration and return any issues.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_episodes == 0 {
            return Err("max_episodes must be > 0");
        }
        if self.max_episode_length == Some(0) {
            return Err("max_episode_length must be > 0");
        }
        if self.save_freq == Some(0) {
            return Err("save_freq must be > 0");
        }
        if self.eval_freq == Some(0) {
            return Err("eval_freq must be > 0");
        }
        if self.progress_freq == 0 {
            return Err("progress_freq must be > 0");
        }
        Ok(())
    }
}

/// Learning rate, exploration rate and discount schedules.
///
/// Each is evaluated with the episode index (offset by `start_episode`) and,
/// for α and γ, the visit count of the pair being updated.
pub struct TabularSchedules {
    pub learning_rate: Box<dyn Schedule>,
    pub epsilon: Box<dyn Schedule>,
    pub gamma: Box<dyn Schedule>,
}

impl TabularSchedules {
    /// Bundle three schedules.
    pub fn new(
        learning_rate: impl Schedule + 'static,
        epsilon: impl Schedule + 'static,
        gamma: impl Schedule + 'static,
    ) -> Self {
        Self {
            learning_rate: Box::new(learning_rate),
            epsilon: Box::new(epsilon),
            gamma: Box::new(gamma),
        }
    }

    /// Fixed α, ε and γ.
    pub fn constant(learning_rate: f64, epsilon: f64, gamma: f64) -> Self {
        Self::new(
            Constant::new(learning_rate),
            Constant::new(epsilon),
            Constant::new(gamma),
        )
    }
}

impl std::fmt::Debug for TabularSchedules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabularSchedules")
            .field("learning_rate", &self.learning_rate.value(0, 0))
            .field("epsilon", &self.epsilon.value(0, 0))
            .field("gamma", &self.gamma.value(0, 0))
            .finish()
    }
}
