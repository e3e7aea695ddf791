//! Hyper-parameter scheduling.
//!
//! ## Available Schedules
//!
//! - [`Constant`]: No scheduling
//! - [`StepDecay`]: Multiplicative decay every `period` steps (ε, α)
//! - [`StepMargin`]: Anneals towards an upper bound (γ → 1)
//! - [`LinearDecay`]: Linear interpolation from start to end
//! - [`VisitDecay`]: Decays with the visit count of a state-action pair
//!
//! ## Example
//!
//! ```rust,ignore
//! use safety_rl::scheduling::{Schedule, StepDecay, StepMargin};
//!
//! let epsilon = StepDecay::new(0.95, 0.05, 1, 0.5);
//! let gamma = StepMargin::new(0.9, 0.9999, 200, 0.5);
//!
//! let eps = epsilon.value(episode, 0);
//! ```

pub mod schedule;


pub use schedule::{Constant, LinearDecay, Schedule, StepDecay, StepMargin, VisitDecay};
