//! Minibatch unpacking and the tensor form of the SBE target.

use std::marker::PhantomData;

use burn::module::{AutodiffModule, ModuleMapper, Param};
use burn::optim::GradientsParams;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;

use crate::core::transition::{Margins, Transition};
use crate::error::{Result, SafetyRlError};

/// Column view of a sampled minibatch.
///
/// Every column must have the batch length; [`BatchColumns::validate`]
/// enforces this before anything is moved onto a device.
#[derive(Debug, Clone, Default)]
pub struct BatchColumns {
    pub states: Vec<Vec<f32>>,
    pub actions: Vec<Vec<f32>>,
    pub rewards: Vec<f32>,
    /// `None` marks a terminal transition.
    pub next_states: Vec<Option<Vec<f32>>>,
    pub margins: Vec<Margins>,
}

impl BatchColumns {
    /// Split transitions into columns.
    pub fn from_transitions(batch: &[Transition]) -> Self {
        let mut columns = Self::default();
        for t in batch {
            columns.states.push(t.state.clone());
            columns.actions.push(t.action.as_floats());
            columns.rewards.push(t.reward);
            columns.next_states.push(t.next_state.clone());
            columns.margins.push(t.margins);
        }
        columns
    }

    /// Number of rows (length of the state column).
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Check column lengths and per-row widths.
    pub fn validate(&self, state_dim: usize, action_dim: usize) -> Result<()> {
        let n = self.len();
        let lengths = [
            ("actions", self.actions.len()),
            ("rewards", self.rewards.len()),
            ("next_states", self.next_states.len()),
            ("margins", self.margins.len()),
        ];
        for (field, found) in lengths {
            if found != n {
                return Err(SafetyRlError::BatchMismatch {
                    field,
                    expected: n,
                    found,
                });
            }
        }

        for s in &self.states {
            check_width("state", state_dim, s.len())?;
        }
        for a in &self.actions {
            check_width("action", action_dim, a.len())?;
        }
        for s in self.next_states.iter().flatten() {
            check_width("next_state", state_dim, s.len())?;
        }
        Ok(())
    }
}

fn check_width(field: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(SafetyRlError::BatchMismatch {
            field,
            expected,
            found,
        });
    }
    Ok(())
}

/// Minibatch on a device.
///
/// Terminal rows carry a zero next state; `non_final` is `1.0` where the
/// next state is defined and `0.0` otherwise.
#[derive(Debug, Clone)]
pub struct TransitionBatch<B: Backend> {
    pub states: Tensor<B, 2>,
    pub actions: Tensor<B, 2>,
    pub next_states: Tensor<B, 2>,
    pub non_final: Tensor<B, 1>,
    pub g_x: Tensor<B, 1>,
    pub l_x: Tensor<B, 1>,
    pub g_x_nxt: Tensor<B, 1>,
    pub l_x_nxt: Tensor<B, 1>,
}

impl<B: Backend> TransitionBatch<B> {
    /// Validate and move a sampled batch onto `device`.
    pub fn from_transitions(
        batch: &[Transition],
        state_dim: usize,
        action_dim: usize,
        device: &B::Device,
    ) -> Result<Self> {
        Self::from_columns(
            &BatchColumns::from_transitions(batch),
            state_dim,
            action_dim,
            device,
        )
    }

    /// Validate and move column data onto `device`.
    pub fn from_columns(
        columns: &BatchColumns,
        state_dim: usize,
        action_dim: usize,
        device: &B::Device,
    ) -> Result<Self> {
        if columns.is_empty() {
            return Err(SafetyRlError::BatchMismatch {
                field: "states",
                expected: 1,
                found: 0,
            });
        }
        columns.validate(state_dim, action_dim)?;
        let n = columns.len();

        let states: Vec<f32> = columns.states.iter().flatten().copied().collect();
        let actions: Vec<f32> = columns.actions.iter().flatten().copied().collect();
        let mut next_states = Vec::with_capacity(n * state_dim);
        let mut non_final = Vec::with_capacity(n);
        for s in &columns.next_states {
            match s {
                Some(s) => {
                    next_states.extend_from_slice(s);
                    non_final.push(1.0);
                }
                None => {
                    next_states.extend(std::iter::repeat(0.0).take(state_dim));
                    non_final.push(0.0);
                }
            }
        }

        let column = |f: fn(&Margins) -> f32| -> Tensor<B, 1> {
            let values: Vec<f32> = columns.margins.iter().map(f).collect();
            Tensor::from_floats(values.as_slice(), device)
        };

        Ok(Self {
            states: Tensor::<B, 1>::from_floats(states.as_slice(), device)
                .reshape([n, state_dim]),
            actions: Tensor::<B, 1>::from_floats(actions.as_slice(), device)
                .reshape([n, action_dim]),
            next_states: Tensor::<B, 1>::from_floats(next_states.as_slice(), device)
                .reshape([n, state_dim]),
            non_final: Tensor::from_floats(non_final.as_slice(), device),
            g_x: column(|m| m.g_x),
            l_x: column(|m| m.l_x),
            g_x_nxt: column(|m| m.g_x_nxt),
            l_x_nxt: column(|m| m.l_x_nxt),
        })
    }

    /// Batch size.
    pub fn len(&self) -> usize {
        self.states.dims()[0]
    }

    /// Always `false`; empty batches are rejected on construction.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Elementwise SBE targets for a batch.
///
/// ```text
/// y = (1-γ)·max(l, g) + γ·max(g', min(l', q_next))   non-terminal
/// y = g'                                              terminal
/// ```
///
/// `q_next` is the bootstrap value at the next state; terminal rows ignore it.
pub fn sbe_td_targets<B: Backend>(
    batch: &TransitionBatch<B>,
    q_next: Tensor<B, 1>,
    gamma: f32,
) -> Tensor<B, 1> {
    let running = batch.l_x.clone().max_pair(batch.g_x.clone());
    let future = batch
        .g_x_nxt
        .clone()
        .max_pair(batch.l_x_nxt.clone().min_pair(q_next));
    let non_terminal = running.mul_scalar(1.0 - gamma) + future.mul_scalar(gamma);

    let terminal = Tensor::ones_like(&batch.non_final) - batch.non_final.clone();
    non_terminal * batch.non_final.clone() + batch.g_x_nxt.clone() * terminal
}

/// Sum of the two heads' mean-squared errors against a shared target.
pub fn twin_critic_loss<B: Backend>(
    q1: Tensor<B, 1>,
    q2: Tensor<B, 1>,
    targets: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let q1_loss = (q1 - targets.clone()).powf_scalar(2.0).mean();
    let q2_loss = (q2 - targets).powf_scalar(2.0).mean();
    q1_loss + q2_loss
}

/// First element of a tensor as `f32`, `NaN` if it cannot be read.
pub fn tensor_to_scalar<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> f32 {
    let data = tensor.clone().into_data();
    data.as_slice::<f32>()
        .ok()
        .and_then(|s| s.first().copied())
        .unwrap_or(f32::NAN)
}

/// Accumulates the squared L2 norm of the gradients of every float parameter.
struct GradNormCollector<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    squared: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleMapper<B> for GradNormCollector<'_, B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(param.id.clone()) {
            self.squared += tensor_to_scalar(&grad.powf_scalar(2.0).sum()) as f64;
        }
        param
    }
}

/// Global L2 norm of `grads` over the parameters of `module`.
///
/// `NaN` or infinite when any gradient entry is.
pub fn gradient_norm<B, M>(module: &M, grads: &GradientsParams) -> f32
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut collector = GradNormCollector::<B> {
        grads,
        squared: 0.0,
        _backend: PhantomData,
    };
    let _ = module.clone().map(&mut collector);
    collector.squared.sqrt() as f32
}
