//! Core types shared by the tabular, actor-critic and policy-gradient learners.

pub mod replay_buffer;
pub mod sbe;
pub mod target_network;
pub mod transition;

pub use replay_buffer::ReplayBuffer;
pub use sbe::{
    discounted_backup, discounted_returns, reach_avoid_outcome, sbe_backup, sbe_nonterminal,
    sbe_outcome, BackupRule,
};
pub use target_network::{hard_copy, soft_update, TargetSync, TargetSyncHook};
pub use transition::{Action, Margins, Transition};
