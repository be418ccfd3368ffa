//! Decides whether a trigger starts a run at all.

use serde::Serialize;

use crate::report::SkipReason;

/// What caused a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Piggybacked on an ordinary request; sampled.
    Traffic,
    /// Explicit operator call from the CLI; never sampled.
    Manual,
    /// Scheduled tick; never sampled.
    Cron,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Traffic => write!(f, "traffic"),
            Trigger::Manual => write!(f, "manual"),
            Trigger::Cron => write!(f, "cron"),
        }
    }
}

/// Source of uniform samples in `[0, 1)`.
pub trait Sampler: Send + Sync {
    fn sample(&self) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSampler;

impl Sampler for RandomSampler {
    fn sample(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Always returns the same value. Useful for deterministic gating.
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler(pub f64);

impl Sampler for FixedSampler {
    fn sample(&self) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Skip(SkipReason),
}

/// Apply the gate.
///
/// A request that came from the warmer itself never runs, even when forced.
/// Forced, manual and cron runs skip sampling; traffic runs proceed with
/// probability `probability`.
#[must_use]
pub fn gate(
    trigger: Trigger,
    force: bool,
    self_triggered: bool,
    probability: f64,
    sampler: &dyn Sampler,
) -> GateDecision {
    if self_triggered {
        return GateDecision::Skip(SkipReason::SelfTrigger);
    }
    if force || trigger != Trigger::Traffic {
        return GateDecision::Proceed;
    }
    if sampler.sample() < probability {
        GateDecision::Proceed
    } else {
        GateDecision::Skip(SkipReason::Probability)
    }
}
