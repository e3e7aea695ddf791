//! Tabular value iteration with the Safety Bellman Equation.
//!
//! - [`Grid`]: uniform discretisation of the state box
//! - [`QTable`]: `Q(s, a)` plus visit counts, shape `cells + [n_actions]`
//! - [`TabularLearner`]: ε-greedy episodes with per-step SBE backups
//! - [`TrainingStats`]: per-episode statistics record

pub mod config;
pub mod evaluation;
pub mod grid;
pub mod learner;
pub mod q_table;
pub mod stats;

#[cfg(test)]
mod tests;

pub use config::{TabularConfig, TabularSchedules, DEFAULT_EPISODE_STEP_CAP};
pub use evaluation::PolicyComparison;
pub use grid::Grid;
pub use learner::{model_path, select_action, stats_path, EpisodeRollout, TabularLearner};
pub use q_table::QTable;
pub use stats::{EpisodeSummary, ScheduleValues, TrainingStats};
