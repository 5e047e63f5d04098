//! Per-request control flow: guard, route, simulate, maybe apply.
//!
//! Every path returns a ranking and a meta-only record. On any failure the
//! ranking is the caller's input, untouched. `Mode::Observe` never mutates.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::canary::router::CanaryRouter;
use crate::core::config_store::ConfigStore;
use crate::core::mode::Mode;
use crate::core::reason::ReasonCode;
use crate::core::settings::{EngineSettings, GuardSettings};
use crate::guard::collapse::CollapseDetector;
use crate::guard::distribution::{DistributionSummary, adjacent_gaps, percentile};
use crate::telemetry::record::TelemetryRecord;
use crate::tiebreak::candidate::RankedCandidate;
use crate::tiebreak::engine::{EvalContext, apply, simulate};
use crate::tiebreak::plan::{canonical_order, swap_budget};

/// One rerank request from the retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankRequest {
    /// Stable key used for canary bucketing (e.g. a request id).
    pub request_key: String,
    /// Candidates as the retriever returned them.
    pub ranked: Vec<RankedCandidate>,
    /// Top-K window; the pipeline default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
    /// Relevance labels, for counters only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevant_ids: Option<BTreeSet<String>>,
    /// Reference doc-id order, for displacement counts only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_order: Option<Vec<String>>,
}

impl RerankRequest {
    /// Request without a window or evaluation context.
    #[must_use]
    pub fn new(request_key: impl Into<String>, ranked: Vec<RankedCandidate>) -> Self {
        Self {
            request_key: request_key.into(),
            ranked,
            k: None,
            relevant_ids: None,
            baseline_order: None,
        }
    }

    /// Set the top-K window.
    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }
}

/// The ranking to return plus the record explaining it.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankOutcome {
    /// Reranked list, or the input untouched.
    pub ranking: Vec<RankedCandidate>,
    /// Meta-only record.
    pub telemetry: TelemetryRecord,
}

/// Guarded tie-break pipeline. Cheap to share across threads.
#[derive(Debug)]
pub struct GuardPipeline {
    store: Arc<ConfigStore>,
    mode: Mode,
    router: CanaryRouter,
    engine: EngineSettings,
}

impl GuardPipeline {
    /// Pipeline with default engine sizing.
    #[must_use]
    pub fn new(store: Arc<ConfigStore>, mode: Mode) -> Self {
        Self {
            store,
            mode,
            router: CanaryRouter::new(),
            engine: EngineSettings::default(),
        }
    }

    /// Pipeline configured from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &GuardSettings) -> Self {
        let store = Arc::new(ConfigStore::new(settings.artifact_paths()));
        Self::new(store, settings.mode).with_engine(settings.engine.clone())
    }

    /// Override window sizing.
    #[must_use]
    pub fn with_engine(mut self, engine: EngineSettings) -> Self {
        self.engine = engine;
        self
    }

    /// Mode every request runs under.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Shared artifact store.
    #[must_use]
    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Router, for exposure counters.
    #[must_use]
    pub fn router(&self) -> &CanaryRouter {
        &self.router
    }

    /// Run one request through the guard.
    #[must_use]
    pub fn process(&self, request: &RerankRequest) -> RerankOutcome {
        let mode = self.mode;
        let ranked = &request.ranked;
        let k = request.k.unwrap_or(self.engine.top_k);
        let ctx = EvalContext::new(
            request.relevant_ids.as_ref(),
            request.baseline_order.as_deref(),
        );

        let thresholds = self.store.load_thresholds_for(mode);
        let canary = self.store.load_canary_config();
        let threshold_failure = thresholds.as_ref().err().copied();
        let canary_failure = canary.as_ref().err().copied();
        let detector = CollapseDetector::new(thresholds);

        let canonical = match canonical_order(ranked) {
            Ok(order) => order,
            Err(reason) => {
                let primaries: Vec<f64> = ranked
                    .iter()
                    .map(|c| c.primary_score.unwrap_or(f64::NAN))
                    .collect();
                let guard = detector.evaluate(&primaries, mode);
                let route = self.router.decide_in(
                    mode,
                    &request.request_key,
                    canary.as_deref().ok(),
                    false,
                );
                let mut telemetry =
                    TelemetryRecord::new(&guard, route.telemetry, route.reason_code, ranked.len(), k);
                telemetry.finish(reason, false);
                return RerankOutcome {
                    ranking: ranked.clone(),
                    telemetry,
                };
            }
        };

        let window: Vec<f64> = canonical
            .iter()
            .take(k)
            .filter_map(|&i| ranked[i].finite_primary())
            .collect();
        let guard = detector.evaluate(&window, mode);
        let distribution = DistributionSummary::from_scores(&window);
        let gap_threshold = percentile(&adjacent_gaps(&window), self.engine.gap_percentile);

        let route = self.router.decide_in(
            mode,
            &request.request_key,
            canary.as_deref().ok(),
            guard.gate_allow,
        );
        let mut telemetry =
            TelemetryRecord::new(&guard, route.telemetry.clone(), route.reason_code, ranked.len(), k);
        telemetry.distribution = Some(distribution);
        telemetry.shadow = simulate(ranked, k, gap_threshold, ctx).ok();

        let blocked = threshold_failure
            .or(canary_failure)
            .or_else(|| (mode.is_enforcing() && !guard.gate_allow).then_some(guard.reason_code).flatten())
            .or_else(|| (!route.selected).then_some(route.reason_code));
        if let Some(reason) = blocked {
            telemetry.finish(reason, false);
            return RerankOutcome {
                ranking: ranked.clone(),
                telemetry,
            };
        }

        if !mode.is_enforcing() {
            telemetry.finish(ReasonCode::ObserveOnly, false);
            return RerankOutcome {
                ranking: ranked.clone(),
                telemetry,
            };
        }

        match apply(ranked, k, gap_threshold, swap_budget(k), ctx) {
            Ok((ranking, counts)) => {
                let changed = counts.applied_swap_count > 0
                    && ranking
                        .iter()
                        .map(|c| &c.doc_id)
                        .ne(ranked.iter().map(|c| &c.doc_id));
                let outcome = if counts.applied_swap_count > 0 {
                    ReasonCode::TiebreakApplied
                } else {
                    ReasonCode::TiebreakNoop
                };
                telemetry.applied = Some(counts);
                telemetry.finish(outcome, changed);
                RerankOutcome { ranking, telemetry }
            }
            Err(reason) => {
                telemetry.finish(reason, false);
                RerankOutcome {
                    ranking: ranked.clone(),
                    telemetry,
                }
            }
        }
    }
}
