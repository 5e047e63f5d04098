//! Observe vs enforce semantics, passed explicitly into every decision.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether guard decisions are advisory or binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Collect telemetry on what would happen; never block, never mutate.
    #[default]
    Observe,
    /// Frozen thresholds gate real traffic.
    Enforce,
}

impl Mode {
    /// Whether guard decisions are binding in this mode.
    #[must_use]
    pub const fn is_enforcing(self) -> bool {
        matches!(self, Self::Enforce)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Observe => write!(f, "observe"),
            Self::Enforce => write!(f, "enforce"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "observe" => Ok(Self::Observe),
            "enforce" => Ok(Self::Enforce),
            other => Err(format!("unknown mode {other:?} (expected observe|enforce)")),
        }
    }
}
