//! Distribution-collapse detection over a top-K score vector.
//!
//! Secondary-signal reordering is only meaningful when the primary scores
//! spread out in a "normal" way. Two degenerate shapes are refused:
//! - **uniform collapse**: every score is (nearly) the same, so near-tie
//!   grouping would sweep the whole window;
//! - **delta collapse**: one or a few candidates dominate.
//!
//! Anything the frozen rules do not positively recognize as healthy is
//! `UNKNOWN`, which blocks intervention under enforcement.

#![allow(clippy::cast_precision_loss)]

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::core::config_store::ConfigStore;
use crate::core::mode::Mode;
use crate::core::reason::ReasonCode;
use crate::core::thresholds::{CollapseRules, ThresholdConfig};

// ──────────────────── states and buckets ────────────────────

/// Classified shape of the score distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardState {
    /// Spread looks normal; intervention may proceed under enforcement.
    Healthy,
    /// Flat distribution.
    CollapsedUniform,
    /// One or a few candidates dominate.
    CollapsedDelta,
    /// Not classifiable (no rule matched, too few scores, or no thresholds).
    Unknown,
}

impl GuardState {
    /// Reason attached to a non-healthy classification.
    #[must_use]
    pub const fn reason_code(self) -> Option<ReasonCode> {
        match self {
            Self::Healthy => None,
            Self::CollapsedUniform => Some(ReasonCode::GuardCollapsedUniform),
            Self::CollapsedDelta => Some(ReasonCode::GuardCollapsedDelta),
            Self::Unknown => Some(ReasonCode::GuardUnknown),
        }
    }
}

impl fmt::Display for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "HEALTHY"),
            Self::CollapsedUniform => write!(f, "COLLAPSED_UNIFORM"),
            Self::CollapsedDelta => write!(f, "COLLAPSED_DELTA"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Coarse entropy band for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntropyBucket {
    /// `< 0.2`
    VeryLow,
    /// `[0.2, 0.4)`
    Low,
    /// `[0.4, 0.6)`
    Medium,
    /// `[0.6, 0.8)`
    High,
    /// `>= 0.8`
    VeryHigh,
}

impl EntropyBucket {
    /// Band for a normalized entropy value.
    #[must_use]
    pub fn from_value(entropy: f64) -> Self {
        if entropy < 0.2 {
            Self::VeryLow
        } else if entropy < 0.4 {
            Self::Low
        } else if entropy < 0.6 {
            Self::Medium
        } else if entropy < 0.8 {
            Self::High
        } else {
            Self::VeryHigh
        }
    }
}

/// Coarse Gini band for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GiniBucket {
    /// `< 0.2`
    LowInequality,
    /// `[0.2, 0.4)`
    MediumInequality,
    /// `[0.4, 0.6)`
    HighInequality,
    /// `>= 0.6`
    VeryHighInequality,
}

impl GiniBucket {
    /// Band for a Gini coefficient.
    #[must_use]
    pub fn from_value(gini: f64) -> Self {
        if gini < 0.2 {
            Self::LowInequality
        } else if gini < 0.4 {
            Self::MediumInequality
        } else if gini < 0.6 {
            Self::HighInequality
        } else {
            Self::VeryHighInequality
        }
    }
}

// ──────────────────── statistics ────────────────────

fn shifted(scores: &[f64]) -> (Vec<f64>, f64) {
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let values: Vec<f64> = scores.iter().map(|s| s - min).collect();
    let sum = values.iter().sum();
    (values, sum)
}

/// Finite scores can still overflow once shifted (e.g. `[1e308, -1e308]`).
fn statistics_defined(scores: &[f64]) -> bool {
    shifted(scores).1.is_finite()
}

/// Normalized Shannon entropy `H / log2(n)` of the min-shifted scores.
///
/// Returns 0 for fewer than two scores, when every score is equal, or when
/// the shifted sum overflows.
#[must_use]
pub fn normalized_entropy(scores: &[f64]) -> f64 {
    if scores.len() <= 1 {
        return 0.0;
    }
    let (values, sum) = shifted(scores);
    if sum <= 0.0 || !sum.is_finite() {
        return 0.0;
    }
    let entropy: f64 = values
        .iter()
        .filter(|v| **v > 0.0)
        .map(|v| {
            let p = v / sum;
            -p * p.log2()
        })
        .sum();
    (entropy / (scores.len() as f64).log2()).clamp(0.0, 1.0)
}

/// Gini coefficient of the min-shifted scores, clamped to `[0, 1]`.
///
/// `G = 2·Σ i·x_(i) / (n·Σx) − (n+1)/n` over ascending values, 1-based.
#[must_use]
pub fn gini_coefficient(scores: &[f64]) -> f64 {
    if scores.len() <= 1 {
        return 0.0;
    }
    let (mut values, sum) = shifted(scores);
    if sum <= 0.0 || !sum.is_finite() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let n = values.len() as f64;
    let weighted: f64 = values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64 + 1.0) * v)
        .sum();
    (2.0 * weighted / (n * sum) - (n + 1.0) / n).clamp(0.0, 1.0)
}

/// First matching rule wins: uniform, then delta, then healthy.
#[must_use]
pub fn classify(entropy: f64, gini: f64, rules: &CollapseRules) -> GuardState {
    let uniform = &rules.collapsed_uniform;
    if let (Some(e_max), Some(g_max)) = (uniform.entropy_max(), uniform.gini_max())
        && e_max.admits_below(entropy)
        && g_max.admits_below(gini)
    {
        return GuardState::CollapsedUniform;
    }

    let delta = &rules.collapsed_delta;
    if let (Some(e_min), Some(g_min)) = (delta.entropy_min(), delta.gini_min())
        && e_min.admits_above(entropy)
        && g_min.admits_above(gini)
    {
        return GuardState::CollapsedDelta;
    }

    let healthy = &rules.healthy;
    if let (Some(e_min), Some(g_max)) = (healthy.entropy_min(), healthy.gini_max())
        && e_min.admits_above(entropy)
        && g_max.admits_below(gini)
    {
        return GuardState::Healthy;
    }

    GuardState::Unknown
}

// ──────────────────── decision ────────────────────

/// Per-request Meta-Guard verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardDecision {
    /// Classification.
    pub state: GuardState,
    /// Whether the experimental path may run.
    pub gate_allow: bool,
    /// Absent only for `HEALTHY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<ReasonCode>,
    /// Normalized entropy in `[0, 1]`.
    pub entropy: f64,
    /// Gini coefficient in `[0, 1]`.
    pub gini: f64,
    /// Band of `entropy`.
    pub entropy_bucket: EntropyBucket,
    /// Band of `gini`.
    pub gini_bucket: GiniBucket,
    /// Fingerprint of the thresholds used, if any loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds_fingerprint: Option<String>,
    /// Schema version of the thresholds used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds_schema_version: Option<String>,
    /// Mode the verdict was made under.
    pub mode: Mode,
}

impl GuardDecision {
    fn unknown(mode: Mode, reason: ReasonCode) -> Self {
        Self {
            state: GuardState::Unknown,
            gate_allow: !mode.is_enforcing(),
            reason_code: Some(reason),
            entropy: 0.0,
            gini: 0.0,
            entropy_bucket: EntropyBucket::VeryLow,
            gini_bucket: GiniBucket::LowInequality,
            thresholds_fingerprint: None,
            thresholds_schema_version: None,
            mode,
        }
    }
}

/// The Meta-Guard. Holds the threshold load outcome it was built with.
#[derive(Debug, Clone)]
pub struct CollapseDetector {
    thresholds: Result<Arc<ThresholdConfig>, ReasonCode>,
}

impl CollapseDetector {
    /// Detector over an already-resolved threshold load outcome.
    #[must_use]
    pub fn new(thresholds: Result<Arc<ThresholdConfig>, ReasonCode>) -> Self {
        Self { thresholds }
    }

    /// Detector using the store's thresholds under `mode` semantics.
    #[must_use]
    pub fn from_store(store: &ConfigStore, mode: Mode) -> Self {
        Self::new(store.load_thresholds_for(mode))
    }

    /// Classify `scores` (the canonical top-K primaries) and gate.
    ///
    /// Observe mode always allows; enforce mode allows only `HEALTHY`.
    #[must_use]
    pub fn evaluate(&self, scores: &[f64], mode: Mode) -> GuardDecision {
        if scores.iter().any(|s| !s.is_finite()) {
            return GuardDecision::unknown(mode, ReasonCode::PrimaryMissing);
        }

        let cfg = match &self.thresholds {
            Ok(cfg) => cfg,
            Err(reason) => {
                let mut decision = GuardDecision::unknown(mode, *reason);
                if scores.len() >= 2 {
                    decision.fill_stats(scores);
                }
                return decision;
            }
        };

        let mut decision = if scores.len() < 2 || !statistics_defined(scores) {
            GuardDecision::unknown(mode, ReasonCode::GuardUnknown)
        } else {
            let mut decision = GuardDecision::unknown(mode, ReasonCode::GuardUnknown);
            decision.fill_stats(scores);
            decision.state = classify(decision.entropy, decision.gini, &cfg.rules);
            decision.reason_code = decision.state.reason_code();
            decision.gate_allow = match mode {
                Mode::Observe => true,
                Mode::Enforce => decision.state == GuardState::Healthy,
            };
            decision
        };
        decision.thresholds_fingerprint = Some(cfg.fingerprint().to_string());
        decision.thresholds_schema_version = Some(cfg.schema_version.clone());
        decision
    }
}

impl GuardDecision {
    fn fill_stats(&mut self, scores: &[f64]) {
        self.entropy = normalized_entropy(scores);
        self.gini = gini_coefficient(scores);
        self.entropy_bucket = EntropyBucket::from_value(self.entropy);
        self.gini_bucket = GiniBucket::from_value(self.gini);
    }
}
