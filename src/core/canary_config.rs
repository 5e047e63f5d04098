//! Canary operational knobs: percentage, kill switch, routing seed.
//!
//! Knobs come from a JSON artifact, or from `GTB_CANARY_*` environment
//! variables when an operator needs to move faster than a deploy. A present
//! but malformed override is a hard failure; it never falls through to the
//! file.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Artifact, GuardError, Result};

/// Overrides `canary_percent` (integer `0..=100`).
pub const ENV_CANARY_PERCENT: &str = "GTB_CANARY_PERCENT";
/// Overrides `kill_switch` (`true`, `1`, `on` or `yes` to block).
pub const ENV_KILL_SWITCH: &str = "GTB_CANARY_KILL_SWITCH";
/// Overrides `routing_seed`.
pub const ENV_ROUTING_SEED: &str = "GTB_CANARY_ROUTING_SEED";

/// Routing seed used when none is configured.
pub const DEFAULT_ROUTING_SEED: &str = "default";

/// Where the effective canary knobs came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigSource {
    /// The JSON artifact.
    File,
    /// `GTB_CANARY_*` environment variables.
    Env,
    /// No usable configuration; only ever reported, never stored on a config.
    MissingFailclosed,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "FILE"),
            Self::Env => write!(f, "ENV"),
            Self::MissingFailclosed => write!(f, "MISSING_FAILCLOSED"),
        }
    }
}

/// Validated canary configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanaryConfig {
    /// Share of buckets routed to the experimental path, `0..=100`.
    pub canary_percent: u8,
    /// Blocks every request when on.
    pub kill_switch: bool,
    /// Loaded and validated for provenance; kept out of telemetry.
    pub routing_seed: String,
    /// Where these knobs came from.
    pub source: ConfigSource,
}

#[derive(Debug, Deserialize)]
struct CanaryDocument {
    canary_percent: u64,
    kill_switch: bool,
    #[serde(default)]
    routing_seed: Option<String>,
}

impl CanaryConfig {
    /// Parse and validate the canary JSON artifact.
    pub fn from_json(raw: &str) -> Result<Self> {
        let doc: CanaryDocument = serde_json::from_str(raw).map_err(|error| match error
            .classify()
        {
            serde_json::error::Category::Data => {
                GuardError::schema(Artifact::CanaryConfig, error.to_string())
            }
            _ => GuardError::ArtifactParse {
                artifact: Artifact::CanaryConfig,
                details: error.to_string(),
            },
        })?;

        Ok(Self {
            canary_percent: checked_percent(doc.canary_percent)?,
            kill_switch: doc.kill_switch,
            routing_seed: doc
                .routing_seed
                .unwrap_or_else(|| DEFAULT_ROUTING_SEED.to_string()),
            source: ConfigSource::File,
        })
    }

    /// Build the configuration from `GTB_CANARY_*` variables.
    ///
    /// Returns `Ok(None)` when neither the percentage nor the kill switch is
    /// set, in which case the caller reads the artifact instead. Missing
    /// companions of a present override take the non-permissive defaults
    /// (0 %, switch off, `"default"` seed).
    pub fn from_env_lookup<F>(mut lookup: F) -> Result<Option<Self>>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut get = |name: &str| lookup(name).filter(|raw| !raw.trim().is_empty());

        let percent_raw = get(ENV_CANARY_PERCENT);
        let kill_raw = get(ENV_KILL_SWITCH);
        if percent_raw.is_none() && kill_raw.is_none() {
            return Ok(None);
        }
        let seed_raw = get(ENV_ROUTING_SEED);

        let canary_percent = match percent_raw {
            Some(raw) => {
                let parsed = raw.trim().parse::<u64>().map_err(|error| {
                    GuardError::schema(
                        Artifact::CanaryConfig,
                        format!("{ENV_CANARY_PERCENT}={raw:?}: {error}"),
                    )
                })?;
                checked_percent(parsed)?
            }
            None => 0,
        };

        let kill_switch = match kill_raw {
            Some(raw) => parse_switch(&raw).ok_or_else(|| {
                GuardError::schema(
                    Artifact::CanaryConfig,
                    format!("{ENV_KILL_SWITCH}={raw:?}: expected true or false"),
                )
            })?,
            None => false,
        };

        Ok(Some(Self {
            canary_percent,
            kill_switch,
            routing_seed: seed_raw.unwrap_or_else(|| DEFAULT_ROUTING_SEED.to_string()),
            source: ConfigSource::Env,
        }))
    }
}

fn checked_percent(value: u64) -> Result<u8> {
    u8::try_from(value)
        .ok()
        .filter(|pct| *pct <= 100)
        .ok_or_else(|| {
            GuardError::schema(
                Artifact::CanaryConfig,
                format!("canary_percent must be in [0, 100], got {value}"),
            )
        })
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}
