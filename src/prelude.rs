//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use tiebreak_guard::prelude::*;
//! ```

// Core
pub use crate::core::config_store::{ArtifactPaths, ConfigStore};
pub use crate::core::errors::{GuardError, Result};
pub use crate::core::mode::Mode;
pub use crate::core::reason::ReasonCode;
pub use crate::core::settings::GuardSettings;

// Guard and routing
pub use crate::canary::router::{CanaryRouter, RouteDecision, canary_bucket};
pub use crate::guard::collapse::{CollapseDetector, GuardDecision, GuardState};

// Tie-break
pub use crate::tiebreak::candidate::RankedCandidate;
pub use crate::tiebreak::engine::{CountsOnly, EvalContext, apply, simulate};
pub use crate::tiebreak::plan::swap_budget;

// Pipeline and telemetry
pub use crate::logger::jsonl::{JsonlWriter, TelemetrySink};
pub use crate::pipeline::{GuardPipeline, RerankOutcome, RerankRequest};
pub use crate::telemetry::record::TelemetryRecord;
