//! Fail-closed loader and process-lifetime cache for the two artifacts.
//!
//! Each artifact is read at most once per [`ConfigStore::invalidate`] cycle.
//! The parse outcome is cached whether it succeeded or not, so a broken file
//! keeps failing with the same reason instead of being re-read per request.
//! Concurrent first loads are serialized under the write lock; every caller
//! observes the same `Arc` snapshot.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::canary_config::CanaryConfig;
use crate::core::errors::{Artifact, GuardError};
use crate::core::mode::Mode;
use crate::core::reason::ReasonCode;
use crate::core::thresholds::ThresholdConfig;

/// Injectable environment lookup (tests never mutate the process env).
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Locations of the versioned artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Frozen collapse-detection thresholds (JSON).
    pub thresholds: PathBuf,
    /// Canary knobs (JSON).
    pub canary: PathBuf,
}

/// A cached load failure: the stable reason plus diagnostic detail.
///
/// The detail may contain paths and parser messages, so it is surfaced only
/// through diagnostics (`gtb check-config`), never through telemetry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    /// Stable reason code.
    pub reason: ReasonCode,
    /// Human-readable detail including the underlying `GTB-xxxx` error.
    pub detail: String,
}

impl LoadFailure {
    fn from_error(error: &GuardError, fallback: ReasonCode) -> Self {
        Self {
            reason: error.reason_code().unwrap_or(fallback),
            detail: error.to_string(),
        }
    }
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.detail)
    }
}

type Snapshot<T> = Result<Arc<T>, LoadFailure>;

/// Versioned-configuration store.
pub struct ConfigStore {
    paths: ArtifactPaths,
    env: EnvLookup,
    thresholds: RwLock<Option<Snapshot<ThresholdConfig>>>,
    canary: RwLock<Option<Snapshot<CanaryConfig>>>,
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("paths", &self.paths)
            .field("thresholds_cached", &self.thresholds.read().is_some())
            .field("canary_cached", &self.canary.read().is_some())
            .finish_non_exhaustive()
    }
}

impl ConfigStore {
    /// Store reading canary overrides from the process environment.
    #[must_use]
    pub fn new(paths: ArtifactPaths) -> Self {
        Self::with_env(paths, Arc::new(|name: &str| std::env::var(name).ok()))
    }

    /// Store with an explicit environment lookup.
    #[must_use]
    pub fn with_env(paths: ArtifactPaths, env: EnvLookup) -> Self {
        Self {
            paths,
            env,
            thresholds: RwLock::new(None),
            canary: RwLock::new(None),
        }
    }

    /// Artifact locations this store reads.
    #[must_use]
    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Thresholds under enforcement semantics (`frozen = true` required).
    pub fn load_thresholds(&self) -> Result<Arc<ThresholdConfig>, ReasonCode> {
        self.load_thresholds_for(Mode::Enforce)
    }

    /// Thresholds for the given mode. Observe mode accepts a draft set.
    pub fn load_thresholds_for(&self, mode: Mode) -> Result<Arc<ThresholdConfig>, ReasonCode> {
        let cfg = self.thresholds_snapshot().map_err(|failure| failure.reason)?;
        if mode.is_enforcing() && !cfg.frozen {
            return Err(ReasonCode::ThresholdsNotFrozenFailclosed);
        }
        Ok(cfg)
    }

    /// Canary knobs: environment override first, then the artifact.
    pub fn load_canary_config(&self) -> Result<Arc<CanaryConfig>, ReasonCode> {
        self.canary_snapshot().map_err(|failure| failure.reason)
    }

    /// Why the thresholds cannot be used under `mode`, if they cannot.
    #[must_use]
    pub fn thresholds_failure(&self, mode: Mode) -> Option<LoadFailure> {
        match self.thresholds_snapshot() {
            Err(failure) => Some(failure),
            Ok(cfg) if mode.is_enforcing() && !cfg.frozen => {
                let error = GuardError::NotFrozen {
                    frozen: Some(false),
                };
                Some(LoadFailure::from_error(
                    &error,
                    ReasonCode::ThresholdsNotFrozenFailclosed,
                ))
            }
            Ok(_) => None,
        }
    }

    /// Why the canary knobs cannot be used, if they cannot.
    #[must_use]
    pub fn canary_failure(&self) -> Option<LoadFailure> {
        self.canary_snapshot().err()
    }

    /// Drop both cached snapshots; the next load re-reads the artifacts.
    pub fn invalidate(&self) {
        *self.thresholds.write() = None;
        *self.canary.write() = None;
    }

    fn thresholds_snapshot(&self) -> Snapshot<ThresholdConfig> {
        {
            let cache = self.thresholds.read();
            if let Some(snapshot) = &*cache {
                return snapshot.clone();
            }
        }

        let mut cache = self.thresholds.write();
        if let Some(snapshot) = &*cache {
            return snapshot.clone();
        }
        let snapshot = read_artifact(Artifact::Thresholds, &self.paths.thresholds)
            .and_then(|raw| ThresholdConfig::from_json(&raw))
            .map(Arc::new)
            .map_err(|error| {
                LoadFailure::from_error(&error, ReasonCode::ThresholdsUnavailableFailclosed)
            });
        *cache = Some(snapshot.clone());
        snapshot
    }

    fn canary_snapshot(&self) -> Snapshot<CanaryConfig> {
        {
            let cache = self.canary.read();
            if let Some(snapshot) = &*cache {
                return snapshot.clone();
            }
        }

        let mut cache = self.canary.write();
        if let Some(snapshot) = &*cache {
            return snapshot.clone();
        }
        let snapshot = CanaryConfig::from_env_lookup(|name| (*self.env)(name))
            .and_then(|from_env| match from_env {
                Some(cfg) => Ok(cfg),
                None => read_artifact(Artifact::CanaryConfig, &self.paths.canary)
                    .and_then(|raw| CanaryConfig::from_json(&raw)),
            })
            .map(Arc::new)
            .map_err(|error| {
                LoadFailure::from_error(&error, ReasonCode::CanaryConfigUnavailableFailclosed)
            });
        *cache = Some(snapshot.clone());
        snapshot
    }
}

fn read_artifact(artifact: Artifact, path: &Path) -> crate::core::errors::Result<String> {
    fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => GuardError::MissingArtifact {
            artifact,
            path: path.to_path_buf(),
        },
        _ => GuardError::Io {
            artifact,
            path: path.to_path_buf(),
            source,
        },
    })
}
