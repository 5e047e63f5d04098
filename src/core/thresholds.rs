//! Frozen collapse-detection thresholds: schema, validation, fingerprint.
//!
//! Threshold sets are authored in an observe-only draft state and must be
//! explicitly promoted (`"frozen": true`) before they can gate real traffic.
//! Parsing here is strict: every bound a classification rule consults must be
//! present, finite and inside `[0, 1]`, and unknown rule keys are rejected so
//! a typo can never silently widen a rule.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::{Artifact, GuardError, Result};

static SCHEMA_VERSION_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^v[0-9]+(\.[0-9]+)*$").ok());

// ──────────────────── rule model ────────────────────

/// Numeric bounds and comparator flags for one distribution state.
///
/// Upper bounds default to exclusive (`value < max`), lower bounds default to
/// inclusive (`value >= min`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollapseRule {
    /// Lower entropy bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy_min: Option<f64>,
    /// Upper entropy bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy_max: Option<f64>,
    /// Lower Gini bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gini_min: Option<f64>,
    /// Upper Gini bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gini_max: Option<f64>,
    /// Make `entropy_min` strict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_entropy_min: Option<bool>,
    /// Make `entropy_max` strict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_entropy_max: Option<bool>,
    /// Make `gini_min` strict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_gini_min: Option<bool>,
    /// Make `gini_max` strict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_gini_max: Option<bool>,
}

/// Which side of a bound a value must fall on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bound {
    /// Threshold value.
    pub value: f64,
    /// Strict comparison.
    pub exclusive: bool,
}

impl Bound {
    /// `value > bound` (exclusive) or `value >= bound`.
    #[must_use]
    pub fn admits_above(self, value: f64) -> bool {
        if self.exclusive {
            value > self.value
        } else {
            value >= self.value
        }
    }

    /// `value < bound` (exclusive) or `value <= bound`.
    #[must_use]
    pub fn admits_below(self, value: f64) -> bool {
        if self.exclusive {
            value < self.value
        } else {
            value <= self.value
        }
    }
}

impl CollapseRule {
    #[must_use]
    pub fn entropy_min(&self) -> Option<Bound> {
        self.entropy_min.map(|value| Bound {
            value,
            exclusive: self.exclusive_entropy_min.unwrap_or(false),
        })
    }

    #[must_use]
    pub fn entropy_max(&self) -> Option<Bound> {
        self.entropy_max.map(|value| Bound {
            value,
            exclusive: self.exclusive_entropy_max.unwrap_or(true),
        })
    }

    #[must_use]
    pub fn gini_min(&self) -> Option<Bound> {
        self.gini_min.map(|value| Bound {
            value,
            exclusive: self.exclusive_gini_min.unwrap_or(false),
        })
    }

    #[must_use]
    pub fn gini_max(&self) -> Option<Bound> {
        self.gini_max.map(|value| Bound {
            value,
            exclusive: self.exclusive_gini_max.unwrap_or(true),
        })
    }

    fn bounds(&self) -> [(&'static str, Option<f64>); 4] {
        [
            ("entropy_min", self.entropy_min),
            ("entropy_max", self.entropy_max),
            ("gini_min", self.gini_min),
            ("gini_max", self.gini_max),
        ]
    }

    fn canonical(&self) -> CanonicalRule {
        CanonicalRule {
            entropy_min: self.entropy_min(),
            entropy_max: self.entropy_max(),
            gini_min: self.gini_min(),
            gini_max: self.gini_max(),
        }
    }
}

/// Rule set for the three classifiable states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollapseRules {
    /// Matched last.
    #[serde(rename = "HEALTHY")]
    pub healthy: CollapseRule,
    /// Matched first.
    #[serde(rename = "COLLAPSED_UNIFORM")]
    pub collapsed_uniform: CollapseRule,
    /// Matched second.
    #[serde(rename = "COLLAPSED_DELTA")]
    pub collapsed_delta: CollapseRule,
}

/// Comparator-resolved form used for fingerprinting, so that spelling out a
/// default flag does not change the content address.
#[derive(Serialize)]
struct CanonicalRule {
    entropy_min: Option<Bound>,
    entropy_max: Option<Bound>,
    gini_min: Option<Bound>,
    gini_max: Option<Bound>,
}

// ──────────────────── artifact document ────────────────────

#[derive(Debug, Deserialize)]
struct ThresholdDocument {
    schema_version: String,
    #[serde(default)]
    frozen: Option<bool>,
    #[serde(default, alias = "frozen_at_utc")]
    frozen_at: Option<String>,
    thresholds: ThresholdBody,
}

#[derive(Debug, Deserialize)]
struct ThresholdBody {
    collapse_detection: CollapseRules,
}

/// A validated threshold set. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdConfig {
    /// Artifact schema, e.g. `v1`.
    pub schema_version: String,
    /// `false` when the `frozen` marker is absent or explicitly `false`.
    pub frozen: bool,
    /// Freeze timestamp, when recorded.
    pub frozen_at: Option<DateTime<Utc>>,
    /// Classification rules.
    pub rules: CollapseRules,
    fingerprint: String,
}

impl ThresholdConfig {
    /// Parse and validate a threshold artifact.
    ///
    /// Frozen-ness is recorded, not enforced: enforcement is the store's job
    /// because observe mode may legitimately run on a draft set.
    pub fn from_json(raw: &str) -> Result<Self> {
        let doc: ThresholdDocument =
            serde_json::from_str(raw).map_err(|error| classify_json_error(&error))?;

        let version_ok = SCHEMA_VERSION_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&doc.schema_version));
        if !version_ok {
            return Err(GuardError::schema(
                Artifact::Thresholds,
                format!("schema_version {:?} must look like v1 or v1.2", doc.schema_version),
            ));
        }

        let frozen_at = match doc.frozen_at.as_deref() {
            Some(raw_ts) => Some(
                DateTime::parse_from_rfc3339(raw_ts)
                    .map_err(|error| {
                        GuardError::schema(
                            Artifact::Thresholds,
                            format!("frozen_at {raw_ts:?} is not RFC 3339: {error}"),
                        )
                    })?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        let frozen = doc.frozen.unwrap_or(false);
        if frozen && frozen_at.is_none() {
            return Err(GuardError::schema(
                Artifact::Thresholds,
                "frozen threshold sets must carry frozen_at",
            ));
        }

        let rules = doc.thresholds.collapse_detection;
        validate_rules(&rules)?;
        let fingerprint = fingerprint_rules(&rules)?;

        Ok(Self {
            schema_version: doc.schema_version,
            frozen,
            frozen_at,
            rules,
            fingerprint,
        })
    }

    /// Stable content address of the canonicalized rule body.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Short form of the fingerprint for human output.
    #[must_use]
    pub fn short_fingerprint(&self) -> &str {
        let end = self.fingerprint.len().min("sha256:".len() + 12);
        &self.fingerprint[..end]
    }
}

fn classify_json_error(error: &serde_json::Error) -> GuardError {
    match error.classify() {
        serde_json::error::Category::Data => {
            GuardError::schema(Artifact::Thresholds, error.to_string())
        }
        _ => GuardError::ArtifactParse {
            artifact: Artifact::Thresholds,
            details: error.to_string(),
        },
    }
}

fn validate_rules(rules: &CollapseRules) -> Result<()> {
    for (state, rule) in [
        ("HEALTHY", &rules.healthy),
        ("COLLAPSED_UNIFORM", &rules.collapsed_uniform),
        ("COLLAPSED_DELTA", &rules.collapsed_delta),
    ] {
        for (name, value) in rule.bounds() {
            if let Some(v) = value
                && !(v.is_finite() && (0.0..=1.0).contains(&v))
            {
                return Err(GuardError::schema(
                    Artifact::Thresholds,
                    format!("{state}.{name} must be in [0, 1], got {v}"),
                ));
            }
        }
    }

    // Each rule must define every bound its classification consults.
    for (state, missing) in [
        (
            "HEALTHY",
            missing_bounds(&[
                ("entropy_min", rules.healthy.entropy_min),
                ("gini_max", rules.healthy.gini_max),
            ]),
        ),
        (
            "COLLAPSED_UNIFORM",
            missing_bounds(&[
                ("entropy_max", rules.collapsed_uniform.entropy_max),
                ("gini_max", rules.collapsed_uniform.gini_max),
            ]),
        ),
        (
            "COLLAPSED_DELTA",
            missing_bounds(&[
                ("entropy_min", rules.collapsed_delta.entropy_min),
                ("gini_min", rules.collapsed_delta.gini_min),
            ]),
        ),
    ] {
        if !missing.is_empty() {
            return Err(GuardError::schema(
                Artifact::Thresholds,
                format!("{state} is missing required bounds: {}", missing.join(", ")),
            ));
        }
    }

    Ok(())
}

fn missing_bounds(required: &[(&'static str, Option<f64>)]) -> Vec<&'static str> {
    required
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect()
}

fn fingerprint_rules(rules: &CollapseRules) -> Result<String> {
    let canonical = serde_json::to_vec(&[
        ("HEALTHY", rules.healthy.canonical()),
        ("COLLAPSED_UNIFORM", rules.collapsed_uniform.canonical()),
        ("COLLAPSED_DELTA", rules.collapsed_delta.canonical()),
    ])?;
    let digest = Sha256::digest(&canonical);
    Ok(format!("sha256:{digest:x}"))
}
