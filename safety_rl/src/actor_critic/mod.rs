//! Twin-critic actor-critic with Safety Bellman Equation targets.
//!
//! - [`SbeTd3`]: replay-based learner with delayed actor updates
//! - [`TwinQ`] / [`DeterministicPolicy`]: network seams, with the
//!   [`TwinQNetwork`] and [`TanhPolicy`] MLPs
//! - [`TransitionBatch`]: validated minibatch tensors and [`sbe_td_targets`]
//! - [`ActorCriticConfig`]: composes the shared [`TrainingConfig`]

pub mod batch;
pub mod config;
pub mod networks;
pub mod td3;


pub use batch::{
    gradient_norm, sbe_td_targets, tensor_to_scalar, twin_critic_loss, BatchColumns,
    TransitionBatch,
};
pub use config::{ActorCriticConfig, TrainingConfig};
pub use networks::{DeterministicPolicy, MlpConfig, QHead, TanhPolicy, TwinQ, TwinQNetwork};
pub use td3::{ActionBounds, SbeTd3, TrainingLosses, UpdateLosses};
