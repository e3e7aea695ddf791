//! Uniform discretisation of a box-shaped state space.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SafetyRlError};

/// Axis-aligned grid over `bounds`, with `cells[d]` cells along dimension `d`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    cells: Vec<usize>,
    bounds: Vec<(f32, f32)>,
}

impl Grid {
    /// Create a grid.
    ///
    /// Every dimension needs at least one cell and a finite `lo < hi` range.
    pub fn new(cells: Vec<usize>, bounds: Vec<(f32, f32)>) -> Result<Self> {
        if cells.is_empty() || cells.len() != bounds.len() {
            return Err(SafetyRlError::InvalidConfig(format!(
                "grid has {} cell counts but {} bounds",
                cells.len(),
                bounds.len()
            )));
        }
        if let Some(d) = cells.iter().position(|&n| n == 0) {
            return Err(SafetyRlError::InvalidConfig(format!(
                "grid dimension {} has zero cells",
                d
            )));
        }
        for (d, &(lo, hi)) in bounds.iter().enumerate() {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(SafetyRlError::InvalidConfig(format!(
                    "grid dimension {} has invalid bounds ({}, {})",
                    d, lo, hi
                )));
            }
        }
        Ok(Self { cells, bounds })
    }

    /// Cells per dimension.
    pub fn cells(&self) -> &[usize] {
        &self.cells
    }

    /// `(lo, hi)` per dimension.
    pub fn bounds(&self) -> &[(f32, f32)] {
        &self.bounds
    }

    /// Number of state dimensions.
    pub fn ndim(&self) -> usize {
        self.cells.len()
    }

    /// Total number of cells.
    pub fn num_cells(&self) -> usize {
        self.cells.iter().product()
    }

    /// Map a continuous state to its cell index.
    ///
    /// States outside the bounds are clamped to the boundary cells.
    pub fn state_to_index(&self, state: &[f32]) -> Vec<usize> {
        self.cells
            .iter()
            .zip(self.bounds.iter())
            .zip(state.iter())
            .map(|((&n, &(lo, hi)), &x)| {
                let x = if x.is_finite() { x.clamp(lo, hi) } else { lo };
                let ix = ((x - lo) * n as f32 / (hi - lo)).floor() as usize;
                ix.min(n - 1)
            })
            .collect()
    }

    /// Centre of the cell at `index`.
    pub fn index_to_state(&self, index: &[usize]) -> Vec<f32> {
        self.cells
            .iter()
            .zip(self.bounds.iter())
            .zip(index.iter())
            .map(|((&n, &(lo, hi)), &i)| {
                let width = (hi - lo) / n as f32;
                lo + (i.min(n - 1) as f32 + 0.5) * width
            })
            .collect()
    }

    /// Iterate over every cell index in row-major order.
    pub fn indices(&self) -> GridIndices<'_> {
        GridIndices {
            cells: &self.cells,
            next: Some(vec![0; self.cells.len()]),
        }
    }
}

/// Row-major iterator over grid cell indices.
pub struct GridIndices<'a> {
    cells: &'a [usize],
    next: Option<Vec<usize>>,
}

impl Iterator for GridIndices<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut succ = current.clone();
        for d in (0..succ.len()).rev() {
            succ[d] += 1;
            if succ[d] < self.cells[d] {
                self.next = Some(succ);
                break;
            }
            succ[d] = 0;
        }
        Some(current)
    }
}
