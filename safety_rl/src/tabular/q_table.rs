//! State-action value table with visit counts.
//!
//! Values are minimax cost-to-go estimates: lower is better, so the greedy
//! policy takes the `argmin` over actions and the state value is the minimum
//! over the action axis.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

use super::grid::Grid;
use crate::environment::MarginFn;
use crate::error::{Result, SafetyRlError};

/// `Q(s, a)` over a discretised state space plus per-pair visit counts.
///
/// Both arrays have shape `grid.cells() + [n_actions]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QTable {
    values: ArrayD<f32>,
    visits: ArrayD<u64>,
}

fn table_shape(grid: &Grid, n_actions: usize) -> Vec<usize> {
    let mut shape = grid.cells().to_vec();
    shape.push(n_actions);
    shape
}

impl QTable {
    /// Boundary-condition initialisation: `Q(s, a) = max(l(s), g(s))` at every
    /// cell centre, for every action.
    pub fn initialize<E: MarginFn + ?Sized>(grid: &Grid, n_actions: usize, env: &E) -> Self {
        let shape = table_shape(grid, n_actions);
        let mut values = ArrayD::<f32>::zeros(IxDyn(&shape));

        for cell in grid.indices() {
            let state = grid.index_to_state(&cell);
            let boundary = env.target_margin(&state).max(env.safety_margin(&state));
            let mut row = values.view_mut();
            for &i in &cell {
                row = row.index_axis_move(Axis(0), i);
            }
            row.fill(boundary);
        }

        Self {
            visits: ArrayD::zeros(IxDyn(&shape)),
            values,
        }
    }

    /// Wrap a table from a previous run.
    ///
    /// Returns [`SafetyRlError::ShapeMismatch`] unless the table shape is
    /// exactly `grid.cells() + [n_actions]`. Visit counts restart at zero.
    pub fn from_warm_start(values: ArrayD<f32>, grid: &Grid, n_actions: usize) -> Result<Self> {
        let expected = table_shape(grid, n_actions);
        if values.shape() != expected.as_slice() {
            return Err(SafetyRlError::ShapeMismatch {
                expected,
                found: values.shape().to_vec(),
            });
        }
        Ok(Self {
            visits: ArrayD::zeros(IxDyn(&expected)),
            values,
        })
    }

    /// Table shape, `grid cells + [n_actions]`.
    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    /// Number of actions (last axis length).
    pub fn n_actions(&self) -> usize {
        self.values.shape().last().copied().unwrap_or(0)
    }

    /// Raw values.
    pub fn values(&self) -> &ArrayD<f32> {
        &self.values
    }

    /// Raw visit counts.
    pub fn visits(&self) -> &ArrayD<u64> {
        &self.visits
    }

    /// Q-values of every action at cell `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` lies outside the grid.
    pub fn row(&self, index: &[usize]) -> ArrayViewD<'_, f32> {
        let mut view = self.values.view();
        for &i in index {
            view = view.index_axis_move(Axis(0), i);
        }
        view
    }

    /// `Q(s, a)`.
    pub fn get(&self, index: &[usize], action: usize) -> f32 {
        self.values[IxDyn(&pair(index, action))]
    }

    /// Visit count of `(s, a)`.
    pub fn visit_count(&self, index: &[usize], action: usize) -> u64 {
        self.visits[IxDyn(&pair(index, action))]
    }

    /// Lowest-cost action at `index`. Ties resolve to the lowest action index.
    pub fn greedy_action(&self, index: &[usize]) -> usize {
        argmin(self.row(index).iter().copied())
    }

    /// `min_a Q(s, a)` at `index`.
    pub fn state_value(&self, index: &[usize]) -> f32 {
        self.row(index).iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// `V(s) = min_a Q(s, a)` over the whole grid.
    pub fn value_function(&self) -> ArrayD<f32> {
        let last = Axis(self.values.ndim() - 1);
        self.values
            .map_axis(last, |row| row.iter().copied().fold(f32::INFINITY, f32::min))
    }

    /// Record one visit of `(s, a)` and return the new count.
    pub fn record_visit(&mut self, index: &[usize], action: usize) -> u64 {
        let count = &mut self.visits[IxDyn(&pair(index, action))];
        *count += 1;
        *count
    }

    /// Convex update `Q ← (1 - α)·Q + α·target`; returns the new value.
    pub fn blend(&mut self, index: &[usize], action: usize, target: f32, alpha: f32) -> f32 {
        let q = &mut self.values[IxDyn(&pair(index, action))];
        *q = (1.0 - alpha) * *q + alpha * target;
        *q
    }

    /// Write values and visit counts as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// Read a table written by [`QTable::save`] and check it against the grid.
    pub fn load(path: &Path, grid: &Grid, n_actions: usize) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let table: QTable = serde_json::from_reader(reader)?;
        let expected = table_shape(grid, n_actions);
        for shape in [table.values.shape(), table.visits.shape()] {
            if shape != expected.as_slice() {
                return Err(SafetyRlError::ShapeMismatch {
                    expected,
                    found: shape.to_vec(),
                });
            }
        }
        Ok(table)
    }
}

fn pair(index: &[usize], action: usize) -> Vec<usize> {
    let mut full = Vec::with_capacity(index.len() + 1);
    full.extend_from_slice(index);
    full.push(action);
    full
}

/// Index of the smallest element; first one wins on ties.
pub(crate) fn argmin<I: IntoIterator<Item = f32>>(values: I) -> usize {
    let mut best = 0;
    let mut best_val = f32::INFINITY;
    for (i, v) in values.into_iter().enumerate() {
        if v < best_val {
            best = i;
            best_val = v;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bowl;

    impl MarginFn for Bowl {
        fn safety_margin(&self, state: &[f32]) -> f32 {
            state[0].abs() - 2.0
        }

        fn target_margin(&self, state: &[f32]) -> f32 {
            state[0]
        }
    }

    fn grid() -> Grid {
        Grid::new(vec![4], vec![(-2.0, 2.0)]).unwrap()
    }

    #[test]
    fn test_initialize_uses_boundary_condition() {
        let grid = grid();
        let table = QTable::initialize(&grid, 3, &Bowl);
        assert_eq!(table.shape(), &[4, 3]);
        for cell in grid.indices() {
            let s = grid.index_to_state(&cell);
            let expected = Bowl.target_margin(&s).max(Bowl.safety_margin(&s));
            for a in 0..3 {
                assert_eq!(table.get(&cell, a), expected);
            }
        }
        assert!(table.visits().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_warm_start_shape_checked() {
        let grid = grid();
        let bad = ArrayD::<f32>::zeros(IxDyn(&[5, 3]));
        match QTable::from_warm_start(bad, &grid, 3) {
            Err(SafetyRlError::ShapeMismatch { expected, found }) => {
                assert_eq!(expected, vec![4, 3]);
                assert_eq!(found, vec![5, 3]);
            }
            other => panic!("expected shape mismatch, got {other:?}"),
        }
        let bad_actions = ArrayD::<f32>::zeros(IxDyn(&[4, 2]));
        assert!(QTable::from_warm_start(bad_actions, &grid, 3).is_err());
        assert!(QTable::from_warm_start(ArrayD::zeros(IxDyn(&[4, 3])), &grid, 3).is_ok());
    }

    #[test]
    fn test_greedy_and_value_function() {
        let grid = grid();
        let mut values = ArrayD::<f32>::zeros(IxDyn(&[4, 3]));
        values[IxDyn(&[1, 0])] = 0.5;
        values[IxDyn(&[1, 1])] = -0.5;
        values[IxDyn(&[1, 2])] = -0.5;
        let table = QTable::from_warm_start(values, &grid, 3).unwrap();

        assert_eq!(table.greedy_action(&[1]), 1);
        assert_eq!(table.greedy_action(&[0]), 0);
        let v = table.value_function();
        assert_eq!(v.shape(), &[4]);
        assert_eq!(v[IxDyn(&[1])], -0.5);
        assert_eq!(table.state_value(&[1]), -0.5);
    }

    #[test]
    fn test_blend_and_visits() {
        let grid = grid();
        let mut table = QTable::from_warm_start(ArrayD::zeros(IxDyn(&[4, 3])), &grid, 3).unwrap();
        assert_eq!(table.record_visit(&[2], 1), 1);
        assert_eq!(table.record_visit(&[2], 1), 2);
        let q = table.blend(&[2], 1, 1.0, 0.25);
        assert!((q - 0.25).abs() < 1e-6);
        assert_eq!(table.visit_count(&[2], 1), 2);
        assert_eq!(table.visit_count(&[2], 0), 0);
    }

    #[test]
    fn test_save_load_roundtrip_validates_shape() {
        let grid = grid();
        let mut table = QTable::initialize(&grid, 2, &Bowl);
        table.record_visit(&[0], 1);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model").join("10.json");

        table.save(&path).unwrap();
        let loaded = QTable::load(&path, &grid, 2).unwrap();
        assert_eq!(loaded, table);

        let other = Grid::new(vec![3], vec![(-2.0, 2.0)]).unwrap();
        assert!(QTable::load(&path, &other, 2).is_err());
    }
}
