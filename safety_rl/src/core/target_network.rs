//! Target network synchronisation.
//!
//! Target critics and the target policy are owned copies of the live
//! networks. They are never trained directly; after every optimizer step the
//! learner calls [`TargetSyncHook::after_step`], which either blends the
//! live weights in (Polyak averaging)
//!
//! ```text
//! θ_target = τ·θ_online + (1 - τ)·θ_target
//! ```
//!
//! or replaces the target outright every `period` steps.

use burn::module::{Module, ModuleMapper, Param};
use burn::prelude::*;

/// Collects every float parameter of a module, flattened, in traversal order.
struct ParamCollector<B: Backend> {
    params: Vec<Tensor<B, 1>>,
}

impl<B: Backend> ModuleMapper<B> for ParamCollector<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        let numel: usize = val.dims().iter().product();
        self.params.push(val.reshape([numel]));
        param
    }
}

/// Blends collected online parameters into the target, matched by traversal
/// order so independently initialised copies of one architecture line up.
struct PolyakMapper<B: Backend> {
    online: Vec<Tensor<B, 1>>,
    tau: f32,
    cursor: usize,
}

impl<B: Backend> ModuleMapper<B> for PolyakMapper<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let idx = self.cursor;
        self.cursor += 1;

        let Some(online) = self.online.get(idx) else {
            return param;
        };

        let target = param.val();
        let shape = target.dims();
        let numel: usize = shape.iter().product();
        let blended = online.clone().mul_scalar(self.tau)
            + target.reshape([numel]).mul_scalar(1.0 - self.tau);

        Param::initialized(param.id.clone(), blended.reshape(shape).detach())
    }
}

/// Polyak-average `online` into `target` with rate `tau`.
///
/// `tau = 1` is a hard copy and `tau = 0` leaves the target untouched.
pub fn soft_update<B, M>(online: &M, target: M, tau: f32) -> M
where
    B: Backend,
    M: Module<B>,
{
    if (tau - 1.0).abs() < 1e-6 {
        return online.clone();
    }
    if tau.abs() < 1e-6 {
        return target;
    }

    let mut collector = ParamCollector { params: Vec::new() };
    let _ = online.clone().map(&mut collector);

    let mut mapper = PolyakMapper {
        online: collector.params,
        tau,
        cursor: 0,
    };
    target.map(&mut mapper)
}

/// Replace the target with a copy of the online network.
pub fn hard_copy<B, M>(online: &M) -> M
where
    B: Backend,
    M: Module<B>,
{
    online.clone()
}

/// How target networks follow the live networks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetSync {
    /// Polyak averaging after every optimizer step.
    Soft {
        /// Interpolation rate τ.
        tau: f32,
    },
    /// Full copy every `period` optimizer steps.
    Hard {
        /// Steps between copies.
        period: usize,
    },
}

impl Default for TargetSync {
    fn default() -> Self {
        TargetSync::Soft { tau: 0.01 }
    }
}

/// Hook invoked after each optimizer step to keep a target network in sync.
#[derive(Debug, Clone)]
pub struct TargetSyncHook {
    mode: TargetSync,
    steps: usize,
}

impl TargetSyncHook {
    /// Create a hook with the given synchronisation mode.
    pub fn new(mode: TargetSync) -> Self {
        Self { mode, steps: 0 }
    }

    /// Count one optimizer step and return the (possibly updated) target.
    pub fn after_step<B, M>(&mut self, online: &M, target: M) -> M
    where
        B: Backend,
        M: Module<B>,
    {
        self.steps += 1;
        match self.mode {
            TargetSync::Soft { tau } => soft_update(online, target, tau),
            TargetSync::Hard { period } => {
                if period > 0 && self.steps % period == 0 {
                    hard_copy(online)
                } else {
                    target
                }
            }
        }
    }

    /// Number of optimizer steps seen.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Synchronisation mode.
    pub fn mode(&self) -> TargetSync {
        self.mode
    }
}
