//! Policy-gradient postprocessing with SBE trajectory outcomes.
//!
//! - [`compute_advantages`]: SBE outcome, GAE or discounted-return advantages
//! - [`postprocess_sbe_advantages`]: the SBE configuration of the above
//! - [`policy_gradient_loss`]: `-mean(log π · A)`

pub mod loss;
pub mod postprocessing;


pub use loss::{policy_gradient_loss, policy_gradient_loss_scalar};
pub use postprocessing::{
    compute_advantages, compute_gae, postprocess_sbe_advantages, postprocess_workers,
    AdvantageConfig, SampleBatch,
};
