//! Transition records consumed by every backup.
//!
//! A transition carries the usual `(s, a, r, s')` tuple plus the four
//! reach-avoid margins reported by the environment:
//!
//! - `g_x` / `g_x_nxt`: safety margin at the current / next state
//!   (negative means the constraint is violated)
//! - `l_x` / `l_x_nxt`: target margin at the current / next state
//!   (negative means the target is reached)
//!
//! Margins are validated once, when the record is built at the environment
//! boundary, so the backup code can assume finite inputs.

use crate::error::{Result, SafetyRlError};

/// Action representation (discrete or continuous).
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Discrete action index
    Discrete(usize),
    /// Continuous action vector
    Continuous(Vec<f32>),
}

impl Action {
    /// Discrete action index, `None` for continuous actions.
    pub fn discrete(&self) -> Option<usize> {
        match self {
            Action::Discrete(a) => Some(*a),
            Action::Continuous(_) => None,
        }
    }

    /// Continuous action vector, `None` for discrete actions.
    pub fn continuous(&self) -> Option<&[f32]> {
        match self {
            Action::Discrete(_) => None,
            Action::Continuous(a) => Some(a),
        }
    }

    /// Flatten to floats (discrete index becomes a single value).
    pub fn as_floats(&self) -> Vec<f32> {
        match self {
            Action::Discrete(a) => vec![*a as f32],
            Action::Continuous(a) => a.clone(),
        }
    }
}

/// Safety and target margins at the current and next state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    /// Safety margin at the current state.
    pub g_x: f32,
    /// Target margin at the current state.
    pub l_x: f32,
    /// Safety margin at the next state.
    pub g_x_nxt: f32,
    /// Target margin at the next state.
    pub l_x_nxt: f32,
}

impl Margins {
    /// Build a validated margin record.
    ///
    /// Returns [`SafetyRlError::InvalidMargins`] if any value is NaN or infinite.
    pub fn new(g_x: f32, l_x: f32, g_x_nxt: f32, l_x_nxt: f32) -> Result<Self> {
        for (field, value) in [
            ("g_x", g_x),
            ("l_x", l_x),
            ("g_x_nxt", g_x_nxt),
            ("l_x_nxt", l_x_nxt),
        ] {
            if !value.is_finite() {
                return Err(SafetyRlError::InvalidMargins { field, value });
            }
        }
        Ok(Self {
            g_x,
            l_x,
            g_x_nxt,
            l_x_nxt,
        })
    }

    /// Margins for a step whose current and next margins coincide.
    pub fn stationary(g_x: f32, l_x: f32) -> Result<Self> {
        Self::new(g_x, l_x, g_x, l_x)
    }

    /// Smallest of the four margins.
    pub fn min(&self) -> f32 {
        self.g_x.min(self.l_x).min(self.g_x_nxt).min(self.l_x_nxt)
    }

    /// Largest of the four margins.
    pub fn max(&self) -> f32 {
        self.g_x.max(self.l_x).max(self.g_x_nxt).max(self.l_x_nxt)
    }
}

/// One environment step.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Current state observation
    pub state: Vec<f32>,
    /// Action taken
    pub action: Action,
    /// Reward received
    pub reward: f32,
    /// Next state, `None` when the episode terminated on this step
    pub next_state: Option<Vec<f32>>,
    /// Reach-avoid margins for this step
    pub margins: Margins,
}

impl Transition {
    /// Create a transition with a discrete action.
    pub fn new_discrete(
        state: Vec<f32>,
        action: usize,
        reward: f32,
        next_state: Option<Vec<f32>>,
        margins: Margins,
    ) -> Self {
        Self {
            state,
            action: Action::Discrete(action),
            reward,
            next_state,
            margins,
        }
    }

    /// Create a transition with a continuous action.
    pub fn new_continuous(
        state: Vec<f32>,
        action: Vec<f32>,
        reward: f32,
        next_state: Option<Vec<f32>>,
        margins: Margins,
    ) -> Self {
        Self {
            state,
            action: Action::Continuous(action),
            reward,
            next_state,
            margins,
        }
    }

    /// Whether the step ended the episode (no next state to bootstrap from).
    pub fn is_terminal(&self) -> bool {
        self.next_state.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margins_reject_non_finite() {
        let err = Margins::new(0.0, f32::NAN, 0.0, 0.0).unwrap_err();
        match err {
            SafetyRlError::InvalidMargins { field, .. } => assert_eq!(field, "l_x"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(Margins::new(0.0, 0.0, f32::INFINITY, 0.0).is_err());
        assert!(Margins::new(0.0, 0.0, 0.0, f32::NEG_INFINITY).is_err());
    }

    #[test]
    fn test_margins_extremes() {
        let m = Margins::new(0.5, -1.0, 2.0, 0.25).unwrap();
        assert_eq!(m.min(), -1.0);
        assert_eq!(m.max(), 2.0);
    }

    #[test]
    fn test_transition_terminal_flag() {
        let m = Margins::stationary(1.0, 1.0).unwrap();
        let t = Transition::new_continuous(vec![0.0], vec![0.1], 0.0, None, m);
        assert!(t.is_terminal());
        assert_eq!(t.action.continuous(), Some(&[0.1f32][..]));
        assert_eq!(t.action.discrete(), None);

        let t = Transition::new_discrete(vec![0.0], 1, 0.0, Some(vec![1.0]), m);
        assert!(!t.is_terminal());
        assert_eq!(t.action.as_floats(), vec![1.0]);
    }
}
