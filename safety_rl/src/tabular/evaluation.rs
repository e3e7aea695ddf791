//! Comparison of a learned value function against a ground-truth grid.
//!
//! A cell is counted as inside the reach-avoid set when its value is `<= 0`.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SafetyRlError};

/// Agreement between learned and ground-truth reach-avoid sets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyComparison {
    /// Fraction of cells classified the same way.
    pub agreement: f32,
    /// Fraction of cells the learner marks inside but the ground truth does not.
    pub false_safe: f32,
    /// Fraction of cells the learner marks outside but the ground truth does not.
    pub false_unsafe: f32,
}

impl PolicyComparison {
    /// Compare two value grids of identical shape.
    pub fn compare(learned: &ArrayD<f32>, truth: &ArrayD<f32>) -> Result<Self> {
        if learned.shape() != truth.shape() {
            return Err(SafetyRlError::ShapeMismatch {
                expected: truth.shape().to_vec(),
                found: learned.shape().to_vec(),
            });
        }
        let n = learned.len();
        if n == 0 {
            return Ok(Self {
                agreement: 1.0,
                false_safe: 0.0,
                false_unsafe: 0.0,
            });
        }

        let (mut agree, mut false_safe, mut false_unsafe) = (0usize, 0usize, 0usize);
        for (&v, &t) in learned.iter().zip(truth.iter()) {
            match (v <= 0.0, t <= 0.0) {
                (true, false) => false_safe += 1,
                (false, true) => false_unsafe += 1,
                _ => agree += 1,
            }
        }

        let n = n as f32;
        Ok(Self {
            agreement: agree as f32 / n,
            false_safe: false_safe as f32 / n,
            false_unsafe: false_unsafe as f32 / n,
        })
    }
}
