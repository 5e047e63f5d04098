//! Settings: TOML file + `GTB_*` env var overrides + defaults.
//!
//! Settings only say where things live and how the pipeline is sized. The
//! versioned artifacts (thresholds, canary knobs) are loaded separately by
//! [`ConfigStore`](crate::core::config_store::ConfigStore) and never fall back
//! to defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config_store::ArtifactPaths;
use crate::core::errors::{GuardError, Result};
use crate::core::mode::Mode;
use crate::logger::jsonl::JsonlConfig;

/// Full settings model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GuardSettings {
    /// Process-wide mode; observe unless configured otherwise.
    pub mode: Mode,
    /// Where the versioned artifacts live.
    pub artifacts: ArtifactSettings,
    /// Window sizing.
    pub engine: EngineSettings,
    /// Telemetry sink.
    pub telemetry: TelemetrySettings,
    /// File the settings were loaded from. Not part of the file itself.
    #[serde(skip)]
    pub config_file: PathBuf,
}

/// Locations of the versioned artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArtifactSettings {
    /// Frozen thresholds JSON.
    pub thresholds_file: PathBuf,
    /// Canary knobs JSON.
    pub canary_file: PathBuf,
}

/// Window sizing for the Meta-Guard and the tie-break engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Default top-K window when a request does not carry one.
    pub top_k: usize,
    /// Percentile of adjacent gaps used as the near-tie threshold.
    pub gap_percentile: f64,
}

/// Telemetry sink tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Write records at all.
    pub enabled: bool,
    /// Primary JSONL file.
    pub jsonl_log: PathBuf,
    /// Used when the primary path cannot be written.
    pub fallback_log: Option<PathBuf>,
    /// Rotate once the active file reaches this size.
    pub max_size_bytes: u64,
    /// Rotated files kept (`.1` through `.N`).
    pub max_rotated_files: u32,
    /// Seconds between forced fsyncs.
    pub fsync_interval_secs: u64,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        let dir = config_dir();
        Self {
            thresholds_file: dir.join("thresholds.json"),
            canary_file: dir.join("canary.json"),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            top_k: 20,
            gap_percentile: 0.25,
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            jsonl_log: data_dir().join("telemetry.jsonl"),
            fallback_log: Some(PathBuf::from("/dev/shm/gtb.jsonl")),
            max_size_bytes: 64 * 1024 * 1024,
            max_rotated_files: 5,
            fsync_interval_secs: 10,
        }
    }
}

impl GuardSettings {
    /// Default settings path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        config_dir().join("config.toml")
    }

    /// Load settings from default or explicit path, then apply env overrides.
    ///
    /// A missing file at the default path is not an error; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, env_var)
    }

    /// [`load`](Self::load) with an explicit environment lookup.
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut settings = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| GuardError::io(&path_buf, source))?;
            toml::from_str::<Self>(&raw)?
        } else if path.is_some() {
            return Err(GuardError::MissingSettings { path: path_buf });
        } else {
            Self::default()
        };

        settings.config_file = path_buf;
        settings.apply_env_overrides_from(lookup)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Deterministic hash of the effective settings for diagnostics.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Artifact locations for a [`ConfigStore`](crate::core::config_store::ConfigStore).
    #[must_use]
    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths {
            thresholds: self.artifacts.thresholds_file.clone(),
            canary: self.artifacts.canary_file.clone(),
        }
    }

    /// Writer configuration for the telemetry sink.
    #[must_use]
    pub fn jsonl_config(&self) -> JsonlConfig {
        JsonlConfig {
            path: self.telemetry.jsonl_log.clone(),
            fallback_path: self.telemetry.fallback_log.clone(),
            max_size_bytes: self.telemetry.max_size_bytes,
            max_rotated_files: self.telemetry.max_rotated_files,
            fsync_interval_secs: self.telemetry.fsync_interval_secs,
        }
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut get = |name: &str| lookup(name).filter(|raw| !raw.trim().is_empty());

        if let Some(raw) = get("GTB_MODE") {
            self.mode = raw.parse().map_err(|details: String| GuardError::SettingsParse {
                context: "env",
                details: format!("GTB_MODE={raw:?}: {details}"),
            })?;
        }
        if let Some(raw) = get("GTB_THRESHOLDS_FILE") {
            self.artifacts.thresholds_file = PathBuf::from(raw);
        }
        if let Some(raw) = get("GTB_CANARY_CONFIG_FILE") {
            self.artifacts.canary_file = PathBuf::from(raw);
        }
        set_env_usize(get("GTB_TOP_K"), "GTB_TOP_K", &mut self.engine.top_k)?;
        set_env_f64(
            get("GTB_GAP_PERCENTILE"),
            "GTB_GAP_PERCENTILE",
            &mut self.engine.gap_percentile,
        )?;
        set_env_bool(
            get("GTB_TELEMETRY_ENABLED"),
            "GTB_TELEMETRY_ENABLED",
            &mut self.telemetry.enabled,
        )?;
        if let Some(raw) = get("GTB_TELEMETRY_JSONL") {
            self.telemetry.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.engine.top_k == 0 {
            return Err(GuardError::InvalidSettings {
                details: "engine.top_k must be at least 1".to_string(),
            });
        }
        validate_prob("engine.gap_percentile", self.engine.gap_percentile)?;

        if self.telemetry.max_rotated_files == 0 {
            return Err(GuardError::InvalidSettings {
                details: "telemetry.max_rotated_files must be at least 1".to_string(),
            });
        }
        if self.telemetry.max_size_bytes < 1024 {
            return Err(GuardError::InvalidSettings {
                details: format!(
                    "telemetry.max_size_bytes must be at least 1024, got {}",
                    self.telemetry.max_size_bytes
                ),
            });
        }
        if self.artifacts.thresholds_file == self.artifacts.canary_file {
            return Err(GuardError::InvalidSettings {
                details: "artifacts.thresholds_file and artifacts.canary_file must differ"
                    .to_string(),
            });
        }
        Ok(())
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[GTB-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn config_dir() -> PathBuf {
    home_dir().join(".config").join("gtb")
}

fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("gtb")
}

fn validate_prob(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(GuardError::InvalidSettings {
            details: format!("{name} must be in [0,1], got {value}"),
        });
    }
    Ok(())
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn set_env_f64(raw: Option<String>, name: &str, slot: &mut f64) -> Result<()> {
    if let Some(raw) = raw {
        *slot = raw.trim().parse::<f64>().map_err(|error| GuardError::SettingsParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_usize(raw: Option<String>, name: &str, slot: &mut usize) -> Result<()> {
    if let Some(raw) = raw {
        *slot = raw
            .trim()
            .parse::<usize>()
            .map_err(|error| GuardError::SettingsParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}

fn set_env_bool(raw: Option<String>, name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = raw {
        *slot = raw.trim().parse::<bool>().map_err(|error| GuardError::SettingsParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}
