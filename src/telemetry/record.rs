//! The per-request telemetry record.

use serde::{Deserialize, Serialize};

use crate::canary::router::CanaryTelemetry;
use crate::core::mode::Mode;
use crate::core::reason::ReasonCode;
use crate::guard::collapse::{EntropyBucket, GiniBucket, GuardDecision, GuardState};
use crate::guard::distribution::DistributionSummary;
use crate::tiebreak::engine::CountsOnly;

/// Severity of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Normal decision (applied, no-op, guard or router refusal).
    Info,
    /// Fail-closed on configuration or malformed input.
    Warning,
}

impl Severity {
    /// Severity implied by the final outcome.
    #[must_use]
    pub const fn for_outcome(reason: ReasonCode) -> Self {
        if reason.is_config_failure() || matches!(reason, ReasonCode::PrimaryMissing) {
            Self::Warning
        } else {
            Self::Info
        }
    }
}

/// Meta-only explanation of one guarded rerank.
///
/// Carries decisions, buckets and counters. Never document ids, scores,
/// term strings, the request key or the routing seed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    /// RFC 3339 UTC timestamp, millisecond precision.
    pub ts: String,
    /// Derived from the outcome.
    pub severity: Severity,
    /// Mode the request ran under.
    pub mode: Mode,
    /// Meta-Guard classification.
    pub guard_state: GuardState,
    /// Meta-Guard verdict.
    pub gate_allow: bool,
    /// Meta-Guard reason, when it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard_reason_code: Option<ReasonCode>,
    /// Entropy band of the top-K primaries.
    pub entropy_bucket: EntropyBucket,
    /// Gini band of the top-K primaries.
    pub gini_bucket: GiniBucket,
    /// `sha256:<hex>` of the threshold artifact in effect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds_fingerprint: Option<String>,
    /// Schema version of that artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds_schema_version: Option<String>,
    /// Routing telemetry.
    pub canary: CanaryTelemetry,
    /// Router reason code.
    pub route_reason_code: ReasonCode,
    /// Top-K score shape; absent when primaries are missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<DistributionSummary>,
    /// Shadow counts, recorded whenever the tie-break could be planned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow: Option<CountsOnly>,
    /// Counts of the realized tie-break, enforce mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<CountsOnly>,
    /// Length of the input ranking.
    pub candidate_count: usize,
    /// Top-K window used.
    pub k: usize,
    /// Final outcome of the request.
    pub outcome_reason_code: ReasonCode,
    /// Whether the returned ranking differs from the input order.
    pub changed: bool,
}

impl TelemetryRecord {
    /// Record seeded from the guard verdict and the routing decision.
    #[must_use]
    pub fn new(
        guard: &GuardDecision,
        canary: CanaryTelemetry,
        route_reason_code: ReasonCode,
        candidate_count: usize,
        k: usize,
    ) -> Self {
        Self {
            ts: format_utc_now(),
            severity: Severity::Info,
            mode: guard.mode,
            guard_state: guard.state,
            gate_allow: guard.gate_allow,
            guard_reason_code: guard.reason_code,
            entropy_bucket: guard.entropy_bucket,
            gini_bucket: guard.gini_bucket,
            thresholds_fingerprint: guard.thresholds_fingerprint.clone(),
            thresholds_schema_version: guard.thresholds_schema_version.clone(),
            canary,
            route_reason_code,
            distribution: None,
            shadow: None,
            applied: None,
            candidate_count,
            k,
            outcome_reason_code: route_reason_code,
            changed: false,
        }
    }

    /// Set the final outcome and derive the severity from it.
    pub fn finish(&mut self, outcome: ReasonCode, changed: bool) {
        self.outcome_reason_code = outcome;
        self.severity = Severity::for_outcome(outcome);
        self.changed = changed;
    }
}

/// Current UTC time as RFC 3339 with milliseconds.
#[must_use]
pub fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
