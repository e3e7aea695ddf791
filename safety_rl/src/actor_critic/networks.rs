//! Critic and policy networks.
//!
//! The learner only depends on the [`TwinQ`] and [`DeterministicPolicy`]
//! traits. [`TwinQNetwork`] and [`TanhPolicy`] are small MLPs implementing
//! them.
//!
//! Policies emit actions in `[-1, 1]` per dimension; the learner rescales
//! them to the environment's action bounds.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Two Q heads over the same `(state, action)` input.
pub trait TwinQ<B: Backend>: Module<B> {
    /// Q-values of both heads, each of shape `[batch]`.
    ///
    /// `state` is `[batch, state_dim]`, `action` is `[batch, action_dim]` in
    /// environment units.
    fn forward(&self, state: Tensor<B, 2>, action: Tensor<B, 2>) -> (Tensor<B, 1>, Tensor<B, 1>);
}

/// Deterministic policy `s -> a` with actions in `[-1, 1]`.
pub trait DeterministicPolicy<B: Backend>: Module<B> {
    /// Normalised actions of shape `[batch, action_dim]`.
    fn forward(&self, state: Tensor<B, 2>) -> Tensor<B, 2>;

    /// Action dimension.
    fn action_dim(&self) -> usize;
}

/// Layer sizes shared by the MLPs below.
#[derive(Debug, Clone)]
pub struct MlpConfig {
    /// Observation dimension.
    pub state_dim: usize,
    /// Action dimension.
    pub action_dim: usize,
    /// Width of both hidden layers.
    pub hidden_dim: usize,
}

impl MlpConfig {
    /// Create a config with 256 hidden units.
    pub fn new(state_dim: usize, action_dim: usize) -> Self {
        Self {
            state_dim,
            action_dim,
            hidden_dim: 256,
        }
    }

    /// Set the hidden width.
    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    /// Build a twin critic.
    pub fn init_critic<B: Backend>(&self, device: &B::Device) -> TwinQNetwork<B> {
        let input = self.state_dim + self.action_dim;
        TwinQNetwork {
            q1: QHead::new(input, self.hidden_dim, device),
            q2: QHead::new(input, self.hidden_dim, device),
        }
    }

    /// Build a tanh policy.
    pub fn init_policy<B: Backend>(&self, device: &B::Device) -> TanhPolicy<B> {
        TanhPolicy {
            fc1: LinearConfig::new(self.state_dim, self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            out: LinearConfig::new(self.hidden_dim, self.action_dim).init(device),
            action_dim: self.action_dim,
        }
    }
}

/// One Q head: two ReLU layers and a scalar output.
#[derive(Module, Debug)]
pub struct QHead<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    out: Linear<B>,
}

impl<B: Backend> QHead<B> {
    fn new(input: usize, hidden: usize, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(input, hidden).init(device),
            fc2: LinearConfig::new(hidden, hidden).init(device),
            out: LinearConfig::new(hidden, 1).init(device),
        }
    }

    /// `[batch, input] -> [batch]`
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 1> {
        let x = relu(self.fc1.forward(x));
        let x = relu(self.fc2.forward(x));
        self.out.forward(x).flatten(0, 1)
    }
}

/// Twin critic with independent heads.
#[derive(Module, Debug)]
pub struct TwinQNetwork<B: Backend> {
    q1: QHead<B>,
    q2: QHead<B>,
}

impl<B: Backend> TwinQ<B> for TwinQNetwork<B> {
    fn forward(&self, state: Tensor<B, 2>, action: Tensor<B, 2>) -> (Tensor<B, 1>, Tensor<B, 1>) {
        let x = Tensor::cat(vec![state, action], 1);
        (self.q1.forward(x.clone()), self.q2.forward(x))
    }
}

/// MLP policy with a tanh output layer.
#[derive(Module, Debug)]
pub struct TanhPolicy<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    out: Linear<B>,
    #[module(skip)]
    action_dim: usize,
}

impl<B: Backend> DeterministicPolicy<B> for TanhPolicy<B> {
    fn forward(&self, state: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.fc1.forward(state));
        let x = relu(self.fc2.forward(x));
        self.out.forward(x).tanh()
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_twin_q_output_shapes() {
        let device = Default::default();
        let critic = MlpConfig::new(3, 2)
            .with_hidden_dim(8)
            .init_critic::<TestBackend>(&device);

        let state = Tensor::<TestBackend, 2>::zeros([5, 3], &device);
        let action = Tensor::<TestBackend, 2>::zeros([5, 2], &device);
        let (q1, q2) = critic.forward(state, action);

        assert_eq!(q1.dims(), [5]);
        assert_eq!(q2.dims(), [5]);
    }

    #[test]
    fn test_policy_actions_bounded() {
        let device = Default::default();
        let policy = MlpConfig::new(2, 3)
            .with_hidden_dim(8)
            .init_policy::<TestBackend>(&device);

        let state = Tensor::<TestBackend, 1>::from_floats([10.0, -10.0, 50.0, 3.0], &device)
            .reshape([2, 2]);
        let actions = policy.forward(state);
        assert_eq!(actions.dims(), [2, 3]);
        assert_eq!(policy.action_dim(), 3);

        let values = actions.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|a| (-1.0..=1.0).contains(a)));
    }
}
