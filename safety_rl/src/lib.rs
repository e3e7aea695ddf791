//! # Safety RL: Reach-Avoid Learning with the Safety Bellman Equation
//!
//! Value-based and policy-based learners for reach-avoid problems, where the
//! goal is to reach a target set while never entering a failure set.
//!
//! Every backup in this crate is built on the discounted Safety Bellman
//! Equation (SBE):
//!
//! ```text
//! V(s) = (1-γ)·max(l(s), g(s)) + γ·max(g(s'), min(l(s'), V(s')))
//! ```
//!
//! with `l` the target margin (negative inside the target) and `g` the safety
//! margin (negative inside the failure set). Values are costs-to-go: lower is
//! better, and a negative value means the target is reachable while staying
//! safe.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          core::sbe                                  │
//! │          sbe_backup · reach_avoid_outcome · sbe_outcome             │
//! ├──────────────────────┬──────────────────────┬───────────────────────┤
//! │  tabular             │  actor_critic        │  policy_gradient      │
//! │  ┌────────────────┐  │  ┌────────────────┐  │  ┌─────────────────┐  │
//! │  │ Grid + QTable  │  │  │ TwinQ critic   │  │  │ SampleBatch     │  │
//! │  │ ε-greedy argmin│  │  │ tanh policy    │  │  │ SBE / GAE /     │  │
//! │  │ per-step backup│  │  │ ReplayBuffer   │  │  │ discounted adv. │  │
//! │  └────────────────┘  │  └────────────────┘  │  └─────────────────┘  │
//! ├──────────────────────┴──────────────────────┴───────────────────────┤
//! │        scheduling · metrics · checkpoint · environment · error      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use safety_rl::tabular::{Grid, TabularConfig, TabularLearner, TabularSchedules};
//! use safety_rl::scheduling::{StepDecay, StepMargin, VisitDecay};
//!
//! let grid = Grid::new(vec![41, 41], vec![(-1.0, 1.0), (-1.0, 1.0)])?;
//! let schedules = TabularSchedules::new(
//!     VisitDecay::new(1.0, 0.5, 0.01),
//!     StepDecay::new(0.95, 0.05, 100, 0.9),
//!     StepMargin::new(0.9, 0.9999, 100, 0.5),
//! );
//! let config = TabularConfig::new()
//!     .with_max_episodes(10_000)
//!     .with_max_episode_length(200);
//!
//! let mut learner = TabularLearner::new(env, grid, schedules, config)?;
//! let stats = learner.train()?;
//! ```

pub mod actor_critic;
pub mod checkpoint;
pub mod core;
pub mod environment;
pub mod error;
pub mod metrics;
pub mod policy_gradient;
pub mod scheduling;
pub mod tabular;

pub use core::{
    reach_avoid_outcome, sbe_backup, sbe_outcome, Action, BackupRule, Margins, ReplayBuffer,
    TargetSync, Transition,
};
pub use error::{Result, SafetyRlError};

pub use environment::{ContinuousReachAvoidEnv, MarginFn, ReachAvoidEnv, StepOutcome};

pub use tabular::{Grid, QTable, TabularConfig, TabularLearner, TabularSchedules, TrainingStats};

pub use actor_critic::{
    ActionBounds, ActorCriticConfig, MlpConfig, SbeTd3, TrainingConfig, TwinQ, TwinQNetwork,
    TanhPolicy,
};

pub use policy_gradient::{compute_advantages, postprocess_sbe_advantages, AdvantageConfig, SampleBatch};

pub use scheduling::{Constant, LinearDecay, Schedule, StepDecay, StepMargin, VisitDecay};

pub use metrics::{ConsoleLogger, CsvLogger, MetricsLogger, MultiLogger, TrainingSnapshot};

pub use checkpoint::{Checkpointer, CheckpointerConfig};
