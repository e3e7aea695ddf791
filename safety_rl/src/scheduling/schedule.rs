//! Hyper-parameter schedules.
//!
//! Learning rate `α`, exploration rate `ε` and discount `γ` all vary over
//! training. A [`Schedule`] maps the current step (episode index for the
//! tabular engine, optimizer-step index for actor-critic) and the visit count
//! of the state-action pair being updated to a value.
//!
//! - `Constant`: fixed value
//! - `StepDecay`: multiplicative decay every `period` steps, floored at `end`
//! - `StepMargin`: decays `1 - value` so the value climbs towards `end`
//!   (used to anneal γ towards 1)
//! - `LinearDecay`: linear interpolation from start to end
//! - `VisitDecay`: `scale / (1 + visits)^power`, a per-pair adaptive rate
//!
//! Any closure `Fn(usize, u64) -> f64` is also a schedule.
//!
//! # Data Integrity
//!
//! Constructors reject non-finite parameters and zero periods in debug
//! builds and sanitise them in release builds; outputs are always finite.

/// Step- and visit-dependent hyper-parameter.
pub trait Schedule {
    /// Value at `step` for a pair visited `visits` times.
    fn value(&self, step: usize, visits: u64) -> f64;
}

impl<F> Schedule for F
where
    F: Fn(usize, u64) -> f64,
{
    fn value(&self, step: usize, visits: u64) -> f64 {
        self(step, visits)
    }
}

/// Number of whole periods in `step`, saturating at `i32::MAX`.
fn elapsed_periods(step: usize, period: usize) -> i32 {
    i32::try_from(step / period).unwrap_or(i32::MAX)
}

fn sanitize(x: f64, fallback: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        fallback
    }
}

/// Constant value (no scheduling).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant(pub f64);

impl Constant {
    /// Create a constant schedule.
    pub fn new(value: f64) -> Self {
        debug_assert!(value.is_finite(), "Constant: value must be finite, got {}", value);
        Self(sanitize(value, 0.0))
    }
}

impl Schedule for Constant {
    fn value(&self, _step: usize, _visits: u64) -> f64 {
        self.0
    }
}

/// `max(end, start · decay^(step / period))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepDecay {
    start: f64,
    end: f64,
    period: usize,
    decay: f64,
}

impl StepDecay {
    /// Create a step-decay schedule.
    ///
    /// # Panics (debug only)
    ///
    /// Panics if `period` is 0 or any value is non-finite.
    pub fn new(start: f64, end: f64, period: usize, decay: f64) -> Self {
        debug_assert!(period > 0, "StepDecay: period must be > 0, got {}", period);
        debug_assert!(
            start.is_finite() && end.is_finite() && decay.is_finite(),
            "StepDecay: parameters must be finite"
        );

        Self {
            start: sanitize(start, 0.0),
            end: sanitize(end, 0.0),
            period: period.max(1),
            decay: sanitize(decay, 1.0),
        }
    }
}

impl Schedule for StepDecay {
    fn value(&self, step: usize, _visits: u64) -> f64 {
        let k = elapsed_periods(step, self.period);
        let v = self.start * self.decay.powi(k);
        sanitize(v, self.end).max(self.end)
    }
}

/// `min(end, 1 - (1 - start) · decay^(step / period))`.
///
/// Used for the discount factor: γ moves from `start` towards `end` (close
/// to 1) as the margin `1 - γ` shrinks geometrically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepMargin {
    start: f64,
    end: f64,
    period: usize,
    decay: f64,
}

impl StepMargin {
    /// Create a step-margin schedule.
    ///
    /// # Panics (debug only)
    ///
    /// Panics if `period` is 0 or any value is non-finite.
    pub fn new(start: f64, end: f64, period: usize, decay: f64) -> Self {
        debug_assert!(period > 0, "StepMargin: period must be > 0, got {}", period);
        debug_assert!(
            start.is_finite() && end.is_finite() && decay.is_finite(),
            "StepMargin: parameters must be finite"
        );

        Self {
            start: sanitize(start, 0.0),
            end: sanitize(end, 1.0),
            period: period.max(1),
            decay: sanitize(decay, 1.0),
        }
    }
}

impl Schedule for StepMargin {
    fn value(&self, step: usize, _visits: u64) -> f64 {
        let k = elapsed_periods(step, self.period);
        let v = 1.0 - (1.0 - self.start) * self.decay.powi(k);
        sanitize(v, self.end).min(self.end)
    }
}

/// Linear interpolation from `start` to `end` over `total_steps`.
///
/// After `total_steps` the value stays at `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearDecay {
    start: f64,
    end: f64,
    total_steps: usize,
}

impl LinearDecay {
    /// Create a linear schedule.
    ///
    /// # Panics (debug only)
    ///
    /// Panics if `total_steps` is 0.
    pub fn new(start: f64, end: f64, total_steps: usize) -> Self {
        debug_assert!(
            total_steps > 0,
            "LinearDecay: total_steps must be > 0, got {}",
            total_steps
        );
        Self {
            start: sanitize(start, 0.0),
            end: sanitize(end, 0.0),
            total_steps,
        }
    }
}

impl Schedule for LinearDecay {
    fn value(&self, step: usize, _visits: u64) -> f64 {
        if self.total_steps == 0 {
            return self.start;
        }
        let progress = (step as f64 / self.total_steps as f64).min(1.0);
        sanitize(self.start + (self.end - self.start) * progress, self.end)
    }
}

/// `max(min, scale / (1 + visits)^power)`.
///
/// Per-pair adaptive learning rate driven by the visit counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisitDecay {
    scale: f64,
    power: f64,
    min: f64,
}

impl VisitDecay {
    /// Create a visit-count schedule.
    pub fn new(scale: f64, power: f64, min: f64) -> Self {
        debug_assert!(
            scale.is_finite() && power.is_finite() && min.is_finite(),
            "VisitDecay: parameters must be finite"
        );
        Self {
            scale: sanitize(scale, 0.0),
            power: sanitize(power, 1.0),
            min: sanitize(min, 0.0),
        }
    }
}

impl Schedule for VisitDecay {
    fn value(&self, _step: usize, visits: u64) -> f64 {
        let v = self.scale / (1.0 + visits as f64).powf(self.power);
        sanitize(v, self.min).max(self.min)
    }
}
