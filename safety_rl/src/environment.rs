//! Environment abstraction for reach-avoid training.
//!
//! The learners never see environment dynamics directly. They call
//! `reset`/`step` and receive the next observation together with the four
//! reach-avoid margins, already validated into a [`Margins`] record. The
//! margin functions themselves are exposed so the tabular engine can seed
//! its table and evaluate against ground truth.

use crate::core::transition::Margins;
use crate::error::Result;

/// Result of a single environment step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Observation after the step.
    pub next_state: Vec<f32>,
    /// Scalar reward (the target margin for SBE environments).
    pub reward: f32,
    /// Whether the episode ended on this step.
    pub done: bool,
    /// Safety and target margins at the current and next state.
    pub margins: Margins,
}

impl StepOutcome {
    /// Create a new step outcome.
    pub fn new(next_state: Vec<f32>, reward: f32, done: bool, margins: Margins) -> Self {
        Self {
            next_state,
            reward,
            done,
            margins,
        }
    }
}

/// Signed distance functions describing the reach-avoid problem.
pub trait MarginFn {
    /// Safety margin `g(s)`; negative inside the failure set.
    fn safety_margin(&self, state: &[f32]) -> f32;

    /// Target margin `l(s)`; negative inside the target set.
    fn target_margin(&self, state: &[f32]) -> f32;
}

/// Single environment with a discrete action space.
///
/// Used by the tabular engine. Episodes are driven synchronously by one
/// training loop.
pub trait ReachAvoidEnv: MarginFn {
    /// Dimension of the observation vector.
    fn state_dim(&self) -> usize;

    /// Number of discrete actions.
    fn n_actions(&self) -> usize;

    /// Start a new episode and return the initial observation.
    fn reset(&mut self) -> Vec<f32>;

    /// Apply action `action` and advance one step.
    ///
    /// Returns an error if the environment produced non-finite margins.
    fn step(&mut self, action: usize) -> Result<StepOutcome>;
}

/// Single environment with a bounded continuous action space.
///
/// Used by the twin-critic actor-critic learner.
pub trait ContinuousReachAvoidEnv: MarginFn {
    /// Dimension of the observation vector.
    fn state_dim(&self) -> usize;

    /// Dimension of the action vector.
    fn action_dim(&self) -> usize;

    /// Per-dimension lower action bound.
    fn action_low(&self) -> Vec<f32>;

    /// Per-dimension upper action bound.
    fn action_high(&self) -> Vec<f32>;

    /// Start a new episode and return the initial observation.
    fn reset(&mut self) -> Vec<f32>;

    /// Apply a continuous action and advance one step.
    fn step(&mut self, action: &[f32]) -> Result<StepOutcome>;
}
