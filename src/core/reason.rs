//! Stable reason codes: the only failure vocabulary that crosses the core boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Machine-stable reason attached to every guard, routing and tie-break decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    // ──── configuration ────
    /// Threshold artifact missing or unreadable.
    ThresholdsUnavailableFailclosed,
    /// Threshold artifact parsed but violates the schema.
    ThresholdsSchemaInvalidFailclosed,
    /// Threshold artifact has not been promoted to `frozen=true`.
    ThresholdsNotFrozenFailclosed,
    /// Canary artifact missing or unreadable.
    CanaryConfigUnavailableFailclosed,
    /// Canary artifact (or its env override) violates the schema.
    CanaryConfigSchemaInvalidFailclosed,

    // ──── meta-guard ────
    /// Score distribution is flat; secondary reordering would be noise.
    GuardCollapsedUniform,
    /// One or a few candidates dominate the distribution.
    GuardCollapsedDelta,
    /// Not enough signal (or no matching rule) to classify.
    GuardUnknown,

    // ──── canary router ────
    /// No valid canary configuration was supplied.
    ConfigInvalidFailclosed,
    /// Operator kill switch is engaged.
    KillSwitchOn,
    /// The meta-guard denied intervention.
    GuardBlocked,
    /// Request bucket falls outside the canary percentage.
    NotSelected,
    /// Request routed onto the experimental path.
    CanarySelected,

    // ──── tie-break engine ────
    /// A primary score was absent or non-finite.
    PrimaryMissing,
    /// At least one near-tie group was reordered.
    TiebreakApplied,
    /// The engine ran but nothing changed (no groups, or zero budget).
    TiebreakNoop,
    /// Observe mode: the ranking is never mutated.
    ObserveOnly,
}

impl ReasonCode {
    /// Wire representation (`SCREAMING_SNAKE_CASE`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ThresholdsUnavailableFailclosed => "THRESHOLDS_UNAVAILABLE_FAILCLOSED",
            Self::ThresholdsSchemaInvalidFailclosed => "THRESHOLDS_SCHEMA_INVALID_FAILCLOSED",
            Self::ThresholdsNotFrozenFailclosed => "THRESHOLDS_NOT_FROZEN_FAILCLOSED",
            Self::CanaryConfigUnavailableFailclosed => "CANARY_CONFIG_UNAVAILABLE_FAILCLOSED",
            Self::CanaryConfigSchemaInvalidFailclosed => "CANARY_CONFIG_SCHEMA_INVALID_FAILCLOSED",
            Self::GuardCollapsedUniform => "GUARD_COLLAPSED_UNIFORM",
            Self::GuardCollapsedDelta => "GUARD_COLLAPSED_DELTA",
            Self::GuardUnknown => "GUARD_UNKNOWN",
            Self::ConfigInvalidFailclosed => "CONFIG_INVALID_FAILCLOSED",
            Self::KillSwitchOn => "KILL_SWITCH_ON",
            Self::GuardBlocked => "GUARD_BLOCKED",
            Self::NotSelected => "NOT_SELECTED",
            Self::CanarySelected => "CANARY_SELECTED",
            Self::PrimaryMissing => "PRIMARY_MISSING",
            Self::TiebreakApplied => "TIEBREAK_APPLIED",
            Self::TiebreakNoop => "TIEBREAK_NOOP",
            Self::ObserveOnly => "OBSERVE_ONLY",
        }
    }

    /// Whether this reason stems from a configuration failure.
    #[must_use]
    pub const fn is_config_failure(self) -> bool {
        matches!(
            self,
            Self::ThresholdsUnavailableFailclosed
                | Self::ThresholdsSchemaInvalidFailclosed
                | Self::ThresholdsNotFrozenFailclosed
                | Self::CanaryConfigUnavailableFailclosed
                | Self::CanaryConfigSchemaInvalidFailclosed
                | Self::ConfigInvalidFailclosed
        )
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
