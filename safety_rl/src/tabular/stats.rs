//! Per-episode training statistics.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::core::sbe::sbe_outcome;
use crate::error::{Result, SafetyRlError};

/// Summary of one finished episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    /// Number of transitions.
    pub length: usize,
    /// Mean reward.
    pub average_reward: f32,
    /// Smallest reward seen.
    pub true_min: f32,
    /// SBE outcome of the reward sequence.
    pub outcome: f32,
}

impl EpisodeSummary {
    /// Summarise an episode's rewards.
    ///
    /// Returns [`SafetyRlError::EmptyEpisode`] for an empty sequence, which
    /// has no defined average.
    pub fn from_rewards(rewards: &[f32], gamma: f32) -> Result<Self> {
        if rewards.is_empty() {
            return Err(SafetyRlError::EmptyEpisode);
        }
        let outcomes = sbe_outcome(rewards, gamma);
        Ok(Self {
            length: rewards.len(),
            average_reward: rewards.iter().sum::<f32>() / rewards.len() as f32,
            true_min: rewards.iter().copied().fold(f32::INFINITY, f32::min),
            outcome: outcomes[0],
        })
    }
}

/// Hyper-parameters in effect at the end of an episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleValues {
    /// Learning rate α.
    pub learning_rate: f64,
    /// Exploration rate ε.
    pub epsilon: f64,
    /// Discount γ.
    pub gamma: f64,
}

/// Statistics record of a tabular run.
///
/// Per-episode arrays are allocated to `max_episodes` up front and filled by
/// index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    /// Wall-clock start, seconds since the Unix epoch.
    pub start_time: u64,
    pub episode_lengths: Vec<usize>,
    pub average_episode_rewards: Vec<f32>,
    pub true_min: Vec<f32>,
    pub episode_outcomes: Vec<f32>,
    pub epsilon: Vec<f64>,
    pub learning_rate: Vec<f64>,
    pub gamma: Vec<f64>,
    pub grid_cells: Vec<usize>,
    pub state_bounds: Vec<(f32, f32)>,
    pub seed: u64,
    /// Index of the last recorded episode.
    pub episode: usize,
    /// Transitions that stayed in the same grid cell.
    pub redundant_steps: u64,
    pub total_steps: u64,
    /// Seconds spent in training, set when the run ends.
    pub time_elapsed: f64,
}

impl TrainingStats {
    /// Empty record for a run of `max_episodes` episodes.
    pub fn new(
        max_episodes: usize,
        grid_cells: Vec<usize>,
        state_bounds: Vec<(f32, f32)>,
        seed: u64,
    ) -> Self {
        let start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            start_time,
            episode_lengths: vec![0; max_episodes],
            average_episode_rewards: vec![0.0; max_episodes],
            true_min: vec![0.0; max_episodes],
            episode_outcomes: vec![0.0; max_episodes],
            epsilon: vec![0.0; max_episodes],
            learning_rate: vec![0.0; max_episodes],
            gamma: vec![0.0; max_episodes],
            grid_cells,
            state_bounds,
            seed,
            episode: 0,
            redundant_steps: 0,
            total_steps: 0,
            time_elapsed: 0.0,
        }
    }

    /// Capacity in episodes.
    pub fn max_episodes(&self) -> usize {
        self.episode_lengths.len()
    }

    /// Store the statistics of episode `episode`.
    pub fn record(
        &mut self,
        episode: usize,
        summary: &EpisodeSummary,
        schedule: &ScheduleValues,
    ) -> Result<()> {
        if episode >= self.max_episodes() {
            return Err(SafetyRlError::InvalidConfig(format!(
                "episode {} outside statistics capacity {}",
                episode,
                self.max_episodes()
            )));
        }
        self.episode_lengths[episode] = summary.length;
        self.average_episode_rewards[episode] = summary.average_reward;
        self.true_min[episode] = summary.true_min;
        self.episode_outcomes[episode] = summary.outcome;
        self.learning_rate[episode] = schedule.learning_rate;
        self.epsilon[episode] = schedule.epsilon;
        self.gamma[episode] = schedule.gamma;
        self.episode = episode;
        Ok(())
    }

    /// Fraction of transitions that did not leave their cell.
    pub fn redundancy(&self) -> f64 {
        self.redundant_steps as f64 / (self.total_steps as f64 + 1.0)
    }

    /// Write the record as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
