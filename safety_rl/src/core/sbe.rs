//! Safety Bellman Equation backups.
//!
//! The reach-avoid value is the minimax of a running max of the safety
//! margin and a running min of the target margin along a trajectory. Its
//! discounted Bellman backup is
//!
//! ```text
//! non-terminal: y = (1-γ)·max(l, g) + γ·max(g', min(l', V'))
//! terminal:     y = g'
//! ```
//!
//! where `V'` is the bootstrapped value of the next state (min over actions
//! in the tabular case, a critic evaluation in the actor-critic case).
//!
//! The standard discounted-reward backup `y = r + γ·max_a Q(s', a)` is kept
//! as [`BackupRule::Discounted`] for comparison runs.

use super::transition::Margins;

/// Which Bellman backup a learner applies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackupRule {
    /// Safety Bellman Equation backup (minimax over margins).
    Sbe,
    /// Sum of discounted rewards.
    Discounted {
        /// Value of a fictitious absorbing state reached on termination.
        fictitious_terminal_value: Option<f32>,
    },
}

impl Default for BackupRule {
    fn default() -> Self {
        BackupRule::Sbe
    }
}

impl BackupRule {
    /// Compute the backup target for one transition.
    ///
    /// `next_q` holds the Q-values of the next state, `None` if the step was
    /// terminal. The SBE rule bootstraps from `min_a Q(s', a)` (values are
    /// costs), the discounted rule from `max_a Q(s', a)`.
    pub fn target(&self, reward: f32, margins: &Margins, next_q: Option<&[f32]>, gamma: f32) -> f32 {
        match self {
            BackupRule::Sbe => {
                let v_next = next_q.map(|q| q.iter().copied().fold(f32::INFINITY, f32::min));
                sbe_backup(margins, v_next, gamma)
            }
            BackupRule::Discounted {
                fictitious_terminal_value,
            } => {
                let v_next = next_q.map(|q| q.iter().copied().fold(f32::NEG_INFINITY, f32::max));
                discounted_backup(reward, v_next, gamma, *fictitious_terminal_value)
            }
        }
    }
}

/// SBE target for a single transition.
///
/// `v_next` is `None` for terminal transitions, in which case the target is
/// the next-state safety margin regardless of γ and the target margins.
#[inline]
pub fn sbe_backup(margins: &Margins, v_next: Option<f32>, gamma: f32) -> f32 {
    match v_next {
        Some(v) => sbe_nonterminal(
            margins.g_x,
            margins.l_x,
            margins.g_x_nxt,
            margins.l_x_nxt,
            v,
            gamma,
        ),
        None => margins.g_x_nxt,
    }
}

/// Non-terminal SBE target from raw scalars.
#[inline]
pub fn sbe_nonterminal(g: f32, l: f32, g_nxt: f32, l_nxt: f32, v_next: f32, gamma: f32) -> f32 {
    (1.0 - gamma) * l.max(g) + gamma * g_nxt.max(l_nxt.min(v_next))
}

/// Standard discounted backup.
///
/// Terminal steps return the reward, or `r + γ·v_term` when a fictitious
/// terminal value is configured.
#[inline]
pub fn discounted_backup(
    reward: f32,
    v_next: Option<f32>,
    gamma: f32,
    fictitious_terminal_value: Option<f32>,
) -> f32 {
    match (v_next, fictitious_terminal_value) {
        (Some(v), _) => reward + gamma * v,
        (None, Some(v_term)) => reward + gamma * v_term,
        (None, None) => reward,
    }
}

/// Reach-avoid outcome of a trajectory, per timestep.
///
/// Backward fold over target margins `l` and safety margins `g`:
///
/// ```text
/// v_T = max(l_T, g_T)
/// v_t = (1-γ)·max(l_t, g_t) + γ·max(g_t, min(l_t, v_{t+1}))
/// ```
///
/// Entry `t` is the outcome of the suffix starting at `t`; entry 0 is the
/// outcome of the whole trajectory. The fold runs in episode order and must
/// not be applied to shuffled timesteps.
///
/// # Panics
///
/// Panics if `l` and `g` have different lengths.
pub fn reach_avoid_outcome(l: &[f32], g: &[f32], gamma: f32) -> Vec<f32> {
    assert_eq!(l.len(), g.len(), "target and safety margins must align");
    let n = l.len();
    let mut outcomes = vec![0.0f32; n];
    if n == 0 {
        return outcomes;
    }

    outcomes[n - 1] = l[n - 1].max(g[n - 1]);
    for t in (0..n - 1).rev() {
        outcomes[t] = sbe_nonterminal(g[t], l[t], g[t], l[t], outcomes[t + 1], gamma);
    }
    outcomes
}

/// SBE outcome of a reward sequence, per timestep.
///
/// Rewards play the role of the target margin and there is no separate
/// safety signal, so this is [`reach_avoid_outcome`] with `g ≡ -∞`:
///
/// ```text
/// v_T = r_T
/// v_t = (1-γ)·r_t + γ·min(r_t, v_{t+1})
/// ```
pub fn sbe_outcome(rewards: &[f32], gamma: f32) -> Vec<f32> {
    let n = rewards.len();
    let mut outcomes = vec![0.0f32; n];
    if n == 0 {
        return outcomes;
    }

    outcomes[n - 1] = rewards[n - 1];
    for t in (0..n - 1).rev() {
        outcomes[t] = (1.0 - gamma) * rewards[t] + gamma * rewards[t].min(outcomes[t + 1]);
    }
    outcomes
}

/// Discounted returns `G_t = r_t + γ·G_{t+1}` bootstrapped from `last_value`.
pub fn discounted_returns(rewards: &[f32], gamma: f32, last_value: f32) -> Vec<f32> {
    let mut returns = vec![0.0f32; rewards.len()];
    let mut running = last_value;
    for t in (0..rewards.len()).rev() {
        running = rewards[t] + gamma * running;
        returns[t] = running;
    }
    returns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn margins(g: f32, l: f32, g_nxt: f32, l_nxt: f32) -> Margins {
        Margins::new(g, l, g_nxt, l_nxt).unwrap()
    }

    #[test]
    fn test_sbe_backup_nonterminal() {
        let m = margins(0.5, 1.0, 0.2, -0.3);
        // (1-0.9)*max(1.0, 0.5) + 0.9*max(0.2, min(-0.3, 0.7)) = 0.1 + 0.18 = 0.28
        let y = sbe_backup(&m, Some(0.7), 0.9);
        assert!((y - 0.28).abs() < 1e-6);
    }

    #[test]
    fn test_sbe_backup_terminal_is_next_safety_margin() {
        let m = margins(0.5, 1.0, -0.4, 3.0);
        for gamma in [0.1, 0.5, 0.99] {
            assert_eq!(sbe_backup(&m, None, gamma), -0.4);
        }
    }

    #[test]
    fn test_sbe_backup_stays_within_margin_range() {
        let levels = [-2.0f32, -0.5, 0.0, 0.7, 3.0];
        let bootstraps = [-100.0f32, -1.0, 0.0, 0.4, 100.0];
        let gammas = [0.01f32, 0.3, 0.5, 0.9, 0.999];

        let mut cases = 0;
        for &g in &levels {
            for &l in &levels {
                for &g_nxt in &levels {
                    for &l_nxt in &levels {
                        let m = margins(g, l, g_nxt, l_nxt);
                        let lo = g.min(l).min(g_nxt).min(l_nxt);
                        let hi = g.max(l).max(g_nxt).max(l_nxt);
                        for &v in &bootstraps {
                            for &gamma in &gammas {
                                let y = sbe_backup(&m, Some(v), gamma);
                                assert!(
                                    y >= lo - 1e-5 && y <= hi + 1e-5,
                                    "target {} outside [{}, {}] for {:?}, V'={}, gamma={}",
                                    y,
                                    lo,
                                    hi,
                                    m,
                                    v,
                                    gamma
                                );
                                cases += 1;
                            }
                        }
                    }
                }
            }
        }
        assert_eq!(cases, 5usize.pow(4) * 25);
    }

    #[test]
    fn test_rule_sbe_uses_min_over_actions() {
        let m = margins(-1.0, 2.0, -1.0, 2.0);
        let y = BackupRule::Sbe.target(0.0, &m, Some(&[0.5, -0.5, 1.5]), 0.5);
        // 0.5*2.0 + 0.5*max(-1.0, min(2.0, -0.5)) = 1.0 - 0.25
        assert!((y - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_rule_discounted() {
        let m = margins(0.0, 0.0, 0.0, 0.0);
        let rule = BackupRule::Discounted {
            fictitious_terminal_value: None,
        };
        let y = rule.target(1.0, &m, Some(&[0.5, 2.0]), 0.5);
        assert!((y - 2.0).abs() < 1e-6);
        assert_eq!(rule.target(1.0, &m, None, 0.5), 1.0);

        let rule = BackupRule::Discounted {
            fictitious_terminal_value: Some(-4.0),
        };
        assert!((rule.target(1.0, &m, None, 0.5) - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_sbe_outcome_manual_fold() {
        // v2 = 2
        // v1 = 0.5*(-1) + 0.5*min(-1, 2) = -1
        // v0 = 0.5*1 + 0.5*min(1, -1) = 0
        let out = sbe_outcome(&[1.0, -1.0, 2.0], 0.5);
        assert_eq!(out.len(), 3);
        assert!((out[2] - 2.0).abs() < 1e-6);
        assert!((out[1] - (-1.0)).abs() < 1e-6);
        assert!(out[0].abs() < 1e-6);
    }

    #[test]
    fn test_sbe_outcome_empty_and_single() {
        assert!(sbe_outcome(&[], 0.9).is_empty());
        assert_eq!(sbe_outcome(&[3.0], 0.9), vec![3.0]);
    }

    #[test]
    fn test_reach_avoid_outcome_matches_sbe_outcome_without_safety() {
        let rewards = [0.3, -0.2, 0.8, 0.1];
        let g = [-1e9f32; 4];
        let a = sbe_outcome(&rewards, 0.8);
        let b = reach_avoid_outcome(&rewards, &g, 0.8);
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_reach_avoid_outcome_safety_dominates() {
        // The safety margin at t=0 dominates the running max.
        let l = [-1.0, -1.0];
        let g = [2.0, 0.0];
        let out = reach_avoid_outcome(&l, &g, 0.5);
        assert!((out[1] - 0.0).abs() < 1e-6);
        // 0.5*max(-1,2) + 0.5*max(2, min(-1, 0)) = 1 + 1
        assert!((out[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_discounted_returns() {
        let r = discounted_returns(&[1.0, 1.0, 1.0], 0.5, 0.0);
        assert!((r[2] - 1.0).abs() < 1e-6);
        assert!((r[1] - 1.5).abs() < 1e-6);
        assert!((r[0] - 1.75).abs() < 1e-6);
    }
}
