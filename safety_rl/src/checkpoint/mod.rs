//! Network checkpointing.
//!
//! ## Example
//!
//! ```rust,ignore
//! use safety_rl::checkpoint::{Checkpointer, CheckpointerConfig};
//!
//! let config = CheckpointerConfig::new("./checkpoints")
//!     .with_save_interval(10_000)
//!     .with_max_models(5);
//!
//! let mut checkpointer = Checkpointer::new(config)?;
//!
//! // In training loop:
//! if checkpointer.should_save(step) {
//!     checkpointer.save("critic", &critic, step)?;
//! }
//!
//! // Resume training:
//! let (critic, step) = checkpointer.load_latest("critic", template, &device)?;
//! ```

pub mod checkpointer;

pub use checkpointer::{CheckpointInfo, Checkpointer, CheckpointerConfig};
