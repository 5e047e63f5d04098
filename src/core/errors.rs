//! GTB-prefixed error types with structured error codes.
//!
//! `GuardError` carries the detail needed for diagnostics (paths, parser
//! messages). It never crosses the request boundary: callers of the decision
//! API only ever see a [`ReasonCode`].

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::reason::ReasonCode;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, GuardError>;

/// Which versioned artifact a configuration failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// Frozen collapse-detection thresholds.
    Thresholds,
    /// Canary operational knobs.
    CanaryConfig,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thresholds => write!(f, "thresholds"),
            Self::CanaryConfig => write!(f, "canary config"),
        }
    }
}

/// Top-level error type for the tie-break guard.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("[GTB-1001] {artifact} artifact missing: {path}")]
    MissingArtifact { artifact: Artifact, path: PathBuf },

    #[error("[GTB-1002] {artifact} artifact unreadable at {path}: {source}")]
    Io {
        artifact: Artifact,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[GTB-1003] {artifact} artifact is not valid JSON: {details}")]
    ArtifactParse { artifact: Artifact, details: String },

    #[error("[GTB-1004] {artifact} schema violation: {details}")]
    SchemaInvalid { artifact: Artifact, details: String },

    #[error("[GTB-1005] thresholds are not frozen (frozen={frozen:?})")]
    NotFrozen { frozen: Option<bool> },

    #[error("[GTB-1101] invalid settings: {details}")]
    InvalidSettings { details: String },

    #[error("[GTB-1102] settings parse failure in {context}: {details}")]
    SettingsParse {
        context: &'static str,
        details: String,
    },

    #[error("[GTB-1103] missing settings file: {path}")]
    MissingSettings { path: PathBuf },

    #[error("[GTB-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[GTB-2201] telemetry record violates meta-only contract: {violation}")]
    MetaOnlyViolation { violation: String },

    #[error("[GTB-3001] IO failure at {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GuardError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingArtifact { .. } => "GTB-1001",
            Self::Io { .. } => "GTB-1002",
            Self::ArtifactParse { .. } => "GTB-1003",
            Self::SchemaInvalid { .. } => "GTB-1004",
            Self::NotFrozen { .. } => "GTB-1005",
            Self::InvalidSettings { .. } => "GTB-1101",
            Self::SettingsParse { .. } => "GTB-1102",
            Self::MissingSettings { .. } => "GTB-1103",
            Self::Serialization { .. } => "GTB-2101",
            Self::MetaOnlyViolation { .. } => "GTB-2201",
            Self::FileIo { .. } => "GTB-3001",
        }
    }

    /// Fail-closed reason code for artifact failures.
    ///
    /// Returns `None` for errors that do not originate from loading an
    /// artifact (settings, telemetry, plain IO).
    #[must_use]
    pub const fn reason_code(&self) -> Option<ReasonCode> {
        match self {
            Self::MissingArtifact { artifact, .. } | Self::Io { artifact, .. } => {
                Some(match artifact {
                    Artifact::Thresholds => ReasonCode::ThresholdsUnavailableFailclosed,
                    Artifact::CanaryConfig => ReasonCode::CanaryConfigUnavailableFailclosed,
                })
            }
            Self::ArtifactParse { artifact, .. } | Self::SchemaInvalid { artifact, .. } => {
                Some(match artifact {
                    Artifact::Thresholds => ReasonCode::ThresholdsSchemaInvalidFailclosed,
                    Artifact::CanaryConfig => ReasonCode::CanaryConfigSchemaInvalidFailclosed,
                })
            }
            Self::NotFrozen { .. } => Some(ReasonCode::ThresholdsNotFrozenFailclosed),
            _ => None,
        }
    }

    /// Convenience constructor for a schema violation.
    #[must_use]
    pub fn schema(artifact: Artifact, details: impl Into<String>) -> Self {
        Self::SchemaInvalid {
            artifact,
            details: details.into(),
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for GuardError {
    fn from(value: toml::de::Error) -> Self {
        Self::SettingsParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
