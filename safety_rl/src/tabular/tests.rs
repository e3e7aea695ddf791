//! Behavioural tests for the tabular learner.

use super::*;
use crate::core::sbe::BackupRule;
use crate::core::transition::{Margins, Transition};
use crate::environment::{MarginFn, ReachAvoidEnv, StepOutcome};
use crate::error::{Result, SafetyRlError};
use crate::scheduling::{Constant, StepDecay, StepMargin, VisitDecay};
use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Walk on `[0, 5)` in unit steps. Cell centres are 0.5 .. 4.5.
///
/// `g(x) = x - 4`, `l(x) = 1 - x`, so the boundary values are
/// `[0.5, -0.5, -1.5, -0.5, 0.5]`.
struct Walk {
    x: f32,
    start: f32,
    terminal_at: Option<f32>,
}

impl Walk {
    fn new(start: f32) -> Self {
        Self {
            x: start,
            start,
            terminal_at: None,
        }
    }
}

impl MarginFn for Walk {
    fn safety_margin(&self, state: &[f32]) -> f32 {
        state[0] - 4.0
    }

    fn target_margin(&self, state: &[f32]) -> f32 {
        1.0 - state[0]
    }
}

impl ReachAvoidEnv for Walk {
    fn state_dim(&self) -> usize {
        1
    }

    fn n_actions(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Vec<f32> {
        self.x = self.start;
        vec![self.x]
    }

    fn step(&mut self, action: usize) -> Result<StepOutcome> {
        let s = [self.x];
        let dx = if action == 0 { -1.0 } else { 1.0 };
        self.x = (self.x + dx).clamp(0.5, 4.5);
        let s_ = [self.x];
        let margins = Margins::new(
            self.safety_margin(&s),
            self.target_margin(&s),
            self.safety_margin(&s_),
            self.target_margin(&s_),
        )?;
        let done = self.terminal_at.map_or(false, |t| (self.x - t).abs() < 1e-6);
        Ok(StepOutcome::new(s_.to_vec(), margins.l_x_nxt, done, margins))
    }
}

fn grid() -> Grid {
    Grid::new(vec![5], vec![(0.0, 5.0)]).unwrap()
}

fn learner(config: TabularConfig, schedules: TabularSchedules) -> TabularLearner<Walk> {
    TabularLearner::new(Walk::new(2.5), grid(), schedules, config).unwrap()
}

fn default_config() -> TabularConfig {
    TabularConfig::new()
        .with_max_episodes(10)
        .with_max_episode_length(3)
        .with_seed(1)
}

mod initialization_tests {
    use super::*;

    #[test]
    fn should_seed_every_action_with_boundary_value() {
        let learner = learner(default_config(), TabularSchedules::constant(0.1, 0.0, 0.9));
        let expected = [0.5, -0.5, -1.5, -0.5, 0.5];
        for (cell, &v) in expected.iter().enumerate() {
            for a in 0..2 {
                assert!((learner.table().get(&[cell], a) - v).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn should_reject_start_episode_without_warm_start() {
        let config = default_config().with_start_episode(100);
        let result = TabularLearner::new(
            Walk::new(2.5),
            grid(),
            TabularSchedules::constant(0.1, 0.0, 0.9),
            config,
        );
        assert!(matches!(result, Err(SafetyRlError::InvalidConfig(_))));
    }

    #[test]
    fn should_reject_misshaped_warm_start() {
        let values = ArrayD::<f32>::zeros(IxDyn(&[4, 2]));
        let result = TabularLearner::warm_start(
            Walk::new(2.5),
            grid(),
            values,
            TabularSchedules::constant(0.1, 0.0, 0.9),
            default_config(),
        );
        match result {
            Err(SafetyRlError::ShapeMismatch { expected, found }) => {
                assert_eq!(expected, vec![5, 2]);
                assert_eq!(found, vec![4, 2]);
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("misshaped table accepted"),
        }
    }

    #[test]
    fn should_accept_warm_start_without_start_episode() {
        let values = ArrayD::<f32>::from_elem(IxDyn(&[5, 2]), 0.25);
        let learner = TabularLearner::warm_start(
            Walk::new(2.5),
            grid(),
            values,
            TabularSchedules::constant(0.1, 0.0, 0.9),
            default_config(),
        )
        .unwrap();
        assert_eq!(learner.table().get(&[3], 1), 0.25);
    }

    #[test]
    fn should_reject_ground_truth_of_wrong_shape() {
        let learner = learner(default_config(), TabularSchedules::constant(0.1, 0.0, 0.9));
        assert!(learner
            .with_ground_truth(ArrayD::zeros(IxDyn(&[5, 2])))
            .is_err());
    }
}

mod action_selection_tests {
    use super::*;

    #[test]
    fn greedy_selection_is_argmin() {
        let mut values = ArrayD::<f32>::zeros(IxDyn(&[5, 2]));
        values[IxDyn(&[1, 1])] = -1.0;
        values[IxDyn(&[2, 0])] = -1.0;
        let table = QTable::from_warm_start(values, &grid(), 2).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..100 {
            assert_eq!(select_action(&table, &[1], 0.0, &mut rng), 1);
            assert_eq!(select_action(&table, &[2], 0.0, &mut rng), 0);
        }
    }

    #[test]
    fn full_exploration_is_uniform() {
        let mut values = ArrayD::<f32>::zeros(IxDyn(&[5, 2]));
        values[IxDyn(&[0, 1])] = -10.0;
        let table = QTable::from_warm_start(values, &grid(), 2).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let n = 10_000;
        let ones = (0..n)
            .filter(|_| select_action(&table, &[0], 1.0, &mut rng) == 1)
            .count();
        // Binomial(10000, 0.5) has std 50
        assert!((4_700..=5_300).contains(&ones), "ones = {}", ones);
    }
}

mod backup_tests {
    use super::*;

    fn transition(next: Option<Vec<f32>>) -> Transition {
        let margins = Margins::new(-1.5, -1.5, -0.5, -2.5).unwrap();
        Transition::new_discrete(vec![2.5], 1, -2.5, next, margins)
    }

    #[test]
    fn nonterminal_update_blends_sbe_target() {
        let mut learner = learner(default_config(), TabularSchedules::constant(0.5, 0.0, 0.9));
        // target = 0.1 * -1.5 + 0.9 * max(-0.5, min(-2.5, -0.5)) = -0.6
        let q = learner.step_update(&transition(Some(vec![3.5])), 0.5, 0.9).unwrap();
        assert!((q - (-1.05)).abs() < 1e-5);
        assert_eq!(learner.table().visit_count(&[2], 1), 1);
        assert_eq!(learner.table().visit_count(&[2], 0), 0);
    }

    #[test]
    fn terminal_update_uses_next_safety_margin() {
        let mut learner = learner(default_config(), TabularSchedules::constant(0.5, 0.0, 0.9));
        let q = learner.step_update(&transition(None), 0.5, 0.9).unwrap();
        assert!((q - (-1.0)).abs() < 1e-5);
    }

    #[test]
    fn discounted_rule_bootstraps_from_max() {
        let config = default_config().with_backup(BackupRule::Discounted {
            fictitious_terminal_value: None,
        });
        let mut learner = learner(config, TabularSchedules::constant(1.0, 0.0, 0.9));
        let mut t = transition(Some(vec![3.5]));
        t.reward = 1.0;
        let q = learner.step_update(&t, 1.0, 0.9).unwrap();
        assert!((q - 0.55).abs() < 1e-5);
    }

    #[test]
    fn rejects_continuous_and_out_of_range_actions() {
        let mut learner = learner(default_config(), TabularSchedules::constant(0.5, 0.0, 0.9));
        let m = Margins::stationary(0.0, 0.0).unwrap();
        let cont = Transition::new_continuous(vec![2.5], vec![0.3], 0.0, None, m);
        assert!(learner.step_update(&cont, 0.5, 0.9).is_err());
        let oob = Transition::new_discrete(vec![2.5], 7, 0.0, None, m);
        assert!(learner.step_update(&oob, 0.5, 0.9).is_err());
    }

    #[test]
    fn rejects_non_finite_schedule_values() {
        let mut learner = learner(default_config(), TabularSchedules::constant(0.5, 0.0, 0.9));
        let before = learner.table().clone();
        assert!(learner
            .step_update(&transition(Some(vec![3.5])), 0.5, f64::NAN)
            .is_err());
        assert_eq!(learner.table(), &before);
    }
}

mod episode_tests {
    use super::*;

    #[test]
    fn schedules_see_fresh_visit_count() {
        let schedules = TabularSchedules::new(
            |_step: usize, visits: u64| if visits == 1 { 1.0 } else { 0.0 },
            Constant::new(0.0),
            Constant::new(0.9),
        );
        let mut learner = learner(default_config(), schedules);
        let rollout = learner.run_episode(0, 1).unwrap();
        assert_eq!(rollout.rewards.len(), 1);

        // Greedy tie at cell 2 picks action 0; the target is
        // 0.1 * -1.5 + 0.9 * max(-2.5, min(-0.5, -0.5)) = -0.6
        assert!((learner.table().get(&[2], 0) - (-0.6)).abs() < 1e-5);
        assert_eq!(rollout.schedule.learning_rate, 1.0);
    }

    #[test]
    fn fresh_run_indexes_schedules_from_one() {
        let schedules = TabularSchedules::new(
            Constant::new(0.1),
            StepDecay::new(1.0, 0.0, 1, 0.5),
            Constant::new(0.9),
        );
        let mut learner = learner(default_config(), schedules);

        let rollout = learner.run_episode(0, 1).unwrap();
        assert!((rollout.schedule.epsilon - 0.5).abs() < 1e-12);
        let rollout = learner.run_episode(2, 1).unwrap();
        assert!((rollout.schedule.epsilon - 0.125).abs() < 1e-12);
    }

    #[test]
    fn warm_start_offsets_schedules_by_start_episode() {
        let schedules = TabularSchedules::new(
            Constant::new(0.1),
            StepDecay::new(1.0, 0.0, 1, 0.5),
            Constant::new(0.9),
        );
        let config = default_config().with_start_episode(3);
        let values = ArrayD::<f32>::zeros(IxDyn(&[5, 2]));
        let mut learner =
            TabularLearner::warm_start(Walk::new(2.5), grid(), values, schedules, config).unwrap();

        let rollout = learner.run_episode(0, 1).unwrap();
        assert!((rollout.schedule.epsilon - 0.125).abs() < 1e-12);
    }

    #[test]
    fn episode_stops_on_done() {
        let mut env = Walk::new(2.5);
        env.terminal_at = Some(1.5);
        let mut learner = TabularLearner::new(
            env,
            grid(),
            TabularSchedules::constant(0.5, 0.0, 0.9),
            default_config(),
        )
        .unwrap();
        let rollout = learner.run_episode(0, 50).unwrap();
        assert_eq!(rollout.rewards.len(), 1);
        // terminal target is g(1.5) = -2.5
        assert!((learner.table().get(&[2], 0) - (-2.0)).abs() < 1e-5);
    }

    #[test]
    fn visit_decay_learning_rate() {
        let schedules = TabularSchedules::new(
            VisitDecay::new(1.0, 1.0, 0.0),
            Constant::new(0.0),
            Constant::new(0.9),
        );
        // action 0 at cell 2 stays greedy after one update
        let mut values = ArrayD::<f32>::zeros(IxDyn(&[5, 2]));
        values[IxDyn(&[2, 0])] = -10.0;
        let mut learner =
            TabularLearner::warm_start(Walk::new(2.5), grid(), values, schedules, default_config())
                .unwrap();
        let rollout = learner.run_episode(0, 1).unwrap();
        assert!((rollout.schedule.learning_rate - 0.5).abs() < 1e-12);
        assert_eq!(learner.table().visit_count(&[2], 0), 1);
        let rollout = learner.run_episode(1, 1).unwrap();
        assert!((rollout.schedule.learning_rate - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(learner.table().visit_count(&[2], 0), 2);
    }
}

mod training_tests {
    use super::*;

    #[test]
    fn train_fills_statistics() {
        let mut learner = learner(default_config(), TabularSchedules::constant(0.1, 0.5, 0.9));
        let stats = learner.train().unwrap();

        assert_eq!(stats.episode, 9);
        assert_eq!(stats.total_steps, 30);
        assert!(stats.episode_lengths.iter().all(|&l| l == 3));
        assert!(stats.learning_rate.iter().all(|&a| (a - 0.1).abs() < 1e-12));
        assert!(stats.epsilon.iter().all(|&e| (e - 0.5).abs() < 1e-12));
        assert!(stats.redundant_steps <= stats.total_steps);
        for (avg, min) in stats.average_episode_rewards.iter().zip(&stats.true_min) {
            assert!(min <= avg);
        }
    }

    #[test]
    fn trains_with_visit_step_and_margin_schedules() {
        let schedules = TabularSchedules::new(
            VisitDecay::new(1.0, 0.5, 0.01),
            StepDecay::new(0.95, 0.05, 100, 0.9),
            StepMargin::new(0.9, 0.9999, 100, 0.5),
        );
        let mut learner = learner(default_config(), schedules);
        let stats = learner.train().unwrap();

        assert!(stats
            .learning_rate
            .iter()
            .all(|&a| (0.01..=1.0).contains(&a)));
        assert!(stats.epsilon.iter().all(|&e| (e - 0.95).abs() < 1e-12));
        assert!(stats.gamma.iter().all(|&g| (g - 0.9).abs() < 1e-12));
    }

    #[test]
    fn training_is_reproducible_from_seed() {
        let run = || {
            let mut learner =
                learner(default_config(), TabularSchedules::constant(0.1, 0.7, 0.9));
            learner.train().unwrap();
            learner.into_parts().0
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn train_evaluates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = default_config()
            .with_eval_freq(5)
            .with_output(dir.path(), 5);
        let truth = ArrayD::from_shape_vec(IxDyn(&[5]), vec![0.5, -0.5, -1.5, -0.5, 0.5]).unwrap();
        let mut learner = learner(config, TabularSchedules::constant(0.1, 0.5, 0.9))
            .with_ground_truth(truth)
            .unwrap();
        learner.train().unwrap();

        let evals = learner.evaluations();
        assert_eq!(evals.len(), 2);
        assert_eq!(evals[0].0, 5);
        assert_eq!(evals[1].0, 10);
        for (_, cmp) in evals {
            let total = cmp.agreement + cmp.false_safe + cmp.false_unsafe;
            assert!((total - 1.0).abs() < 1e-5);
        }

        for episode in [0, 5, 10] {
            assert!(model_path(dir.path(), episode).exists(), "missing model {}", episode);
        }
        let stats_file = stats_path(dir.path());
        let raw = std::fs::read_to_string(stats_file).unwrap();
        let stats: TrainingStats = serde_json::from_str(&raw).unwrap();
        assert_eq!(stats.episode_lengths.len(), 10);
        assert!(stats.time_elapsed >= 0.0);

        let reloaded = QTable::load(&model_path(dir.path(), 10), &grid(), 2).unwrap();
        assert_eq!(reloaded.shape(), &[5, 2]);
    }

    #[test]
    fn play_is_greedy_and_bounded() {
        let mut learner = learner(default_config(), TabularSchedules::constant(0.1, 0.0, 0.9));
        let before = learner.table().clone();
        let lengths = learner.play(3, 4).unwrap();
        assert_eq!(lengths, vec![4, 4, 4]);
        assert_eq!(learner.table(), &before);
    }
}
