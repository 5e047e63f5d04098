//! Deterministic canary routing.
//!
//! A request key hashes to a stable bucket in `[0, 100)`. The request takes
//! the experimental path only when a valid config exists, the kill switch is
//! off, the Meta-Guard allows, and the bucket falls under the percentage, in
//! that precedence order. In observe mode a selected request is only
//! eligible: it is neither marked applied nor counted as exposure.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::canary_config::{CanaryConfig, ConfigSource};
use crate::core::mode::Mode;
use crate::core::reason::ReasonCode;

/// Stable bucket for a request key: first 8 bytes of SHA-256, big-endian, mod 100.
///
/// The empty key maps to bucket 0.
#[must_use]
pub fn canary_bucket(request_key: &str) -> u8 {
    if request_key.is_empty() {
        return 0;
    }
    let digest = Sha256::digest(request_key.as_bytes());
    let mut head = [0_u8; 8];
    head.copy_from_slice(&digest[..8]);
    // Always < 100, so the narrowing is lossless.
    #[allow(clippy::cast_possible_truncation)]
    let bucket = (u64::from_be_bytes(head) % 100) as u8;
    bucket
}

/// Routing telemetry, identically shaped on every path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanaryTelemetry {
    /// Canary percentage at decision time; absent without a valid config.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canary_percent: Option<u8>,
    /// Kill switch at decision time; absent without a valid config.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kill_switch: Option<bool>,
    /// Stable bucket of the request key.
    pub canary_bucket: u8,
    /// Whether the request is exposed to the experimental path.
    pub applied: bool,
    /// Running exposure of the router instance: applied / decided.
    pub applied_ratio: f64,
    /// Why the request was not applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason_code: Option<ReasonCode>,
    /// Where the config came from.
    pub config_source: ConfigSource,
}

/// Outcome of one routing decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDecision {
    /// Every routing check passed (`CANARY_SELECTED`).
    pub selected: bool,
    /// Selected and enforcing: the caller may mutate the ranking.
    pub apply: bool,
    /// First failing check in precedence order, or `CANARY_SELECTED`.
    pub reason_code: ReasonCode,
    /// Meta-only record of the decision.
    pub telemetry: CanaryTelemetry,
}

/// Canary router with lock-free exposure counters.
#[derive(Debug, Default)]
pub struct CanaryRouter {
    decided: AtomicU64,
    applied: AtomicU64,
}

impl CanaryRouter {
    /// Router with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one request on the enforcing path.
    pub fn decide(
        &self,
        request_key: &str,
        config: Option<&CanaryConfig>,
        gate_allow: bool,
    ) -> RouteDecision {
        self.decide_in(Mode::Enforce, request_key, config, gate_allow)
    }

    /// Route one request under `mode`.
    ///
    /// The reason code does not depend on the mode. Only enforce mode turns a
    /// selection into exposure.
    pub fn decide_in(
        &self,
        mode: Mode,
        request_key: &str,
        config: Option<&CanaryConfig>,
        gate_allow: bool,
    ) -> RouteDecision {
        let bucket = canary_bucket(request_key);

        let reason = match config {
            None => ReasonCode::ConfigInvalidFailclosed,
            Some(cfg) if cfg.kill_switch => ReasonCode::KillSwitchOn,
            Some(_) if !gate_allow => ReasonCode::GuardBlocked,
            Some(cfg) if bucket >= cfg.canary_percent => ReasonCode::NotSelected,
            Some(_) => ReasonCode::CanarySelected,
        };
        let selected = reason == ReasonCode::CanarySelected;
        let apply = selected && mode.is_enforcing();

        let decided = self.decided.fetch_add(1, Ordering::Relaxed) + 1;
        let applied = if apply {
            self.applied.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            self.applied.load(Ordering::Relaxed)
        };

        let blocked_reason_code = if !selected {
            Some(reason)
        } else if !apply {
            Some(ReasonCode::ObserveOnly)
        } else {
            None
        };

        RouteDecision {
            selected,
            apply,
            reason_code: reason,
            telemetry: CanaryTelemetry {
                canary_percent: config.map(|cfg| cfg.canary_percent),
                kill_switch: config.map(|cfg| cfg.kill_switch),
                canary_bucket: bucket,
                applied: apply,
                applied_ratio: ratio(applied, decided),
                blocked_reason_code,
                config_source: config.map_or(ConfigSource::MissingFailclosed, |cfg| cfg.source),
            },
        }
    }

    /// Exposure so far: `(applied, decided)`.
    #[must_use]
    pub fn exposure(&self) -> (u64, u64) {
        (
            self.applied.load(Ordering::Relaxed),
            self.decided.load(Ordering::Relaxed),
        )
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(applied: u64, decided: u64) -> f64 {
    if decided == 0 {
        return 0.0;
    }
    (applied.min(decided) as f64 / decided as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::canary_config::DEFAULT_ROUTING_SEED;

    fn cfg(percent: u8, kill_switch: bool) -> CanaryConfig {
        CanaryConfig {
            canary_percent: percent,
            kill_switch,
            routing_seed: DEFAULT_ROUTING_SEED.to_string(),
            source: ConfigSource::File,
        }
    }

    #[test]
    fn bucket_is_stable_and_in_range() {
        for key in ["req-1", "req-2", "q:42", "ünïcødé", "a"] {
            let first = canary_bucket(key);
            assert_eq!(first, canary_bucket(key));
            assert!(first < 100);
        }
        assert_eq!(canary_bucket(""), 0);
    }

    #[test]
    fn bucket_matches_sha256_prefix() {
        // sha256("abc") = ba7816bf8f01cfea...
        let expected = u64::from_be_bytes([0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea]) % 100;
        assert_eq!(u64::from(canary_bucket("abc")), expected);
    }

    #[test]
    fn buckets_spread_across_range() {
        let distinct: std::collections::BTreeSet<u8> =
            (0..2_000).map(|i| canary_bucket(&format!("req-{i}"))).collect();
        assert!(distinct.len() > 90, "only {} buckets hit", distinct.len());
    }

    #[test]
    fn precedence_order() {
        let router = CanaryRouter::new();
        assert_eq!(
            router.decide("k", None, true).reason_code,
            ReasonCode::ConfigInvalidFailclosed
        );
        assert_eq!(
            router.decide("k", Some(&cfg(100, true)), false).reason_code,
            ReasonCode::KillSwitchOn
        );
        assert_eq!(
            router.decide("k", Some(&cfg(100, false)), false).reason_code,
            ReasonCode::GuardBlocked
        );
        assert_eq!(
            router.decide("k", Some(&cfg(0, false)), true).reason_code,
            ReasonCode::NotSelected
        );
        let selected = router.decide("k", Some(&cfg(100, false)), true);
        assert!(selected.apply);
        assert_eq!(selected.reason_code, ReasonCode::CanarySelected);
        assert_eq!(selected.telemetry.blocked_reason_code, None);
    }

    #[test]
    fn zero_percent_never_applies_and_full_percent_always_does() {
        let router = CanaryRouter::new();
        for i in 0..500 {
            let key = format!("request-{i}");
            assert!(!router.decide(&key, Some(&cfg(0, false)), true).apply);
            assert!(router.decide(&key, Some(&cfg(100, false)), true).apply);
        }
    }

    #[test]
    fn telemetry_shape_on_missing_config() {
        let router = CanaryRouter::new();
        let decision = router.decide("k", None, true);
        assert!(!decision.apply);
        assert_eq!(decision.telemetry.canary_percent, None);
        assert_eq!(decision.telemetry.kill_switch, None);
        assert_eq!(decision.telemetry.config_source, ConfigSource::MissingFailclosed);
        assert_eq!(
            decision.telemetry.blocked_reason_code,
            Some(ReasonCode::ConfigInvalidFailclosed)
        );
        assert_eq!(decision.telemetry.canary_bucket, canary_bucket("k"));
    }

    #[test]
    fn telemetry_never_contains_routing_seed() {
        let router = CanaryRouter::new();
        let mut config = cfg(50, false);
        config.routing_seed = "very-secret-seed".to_string();
        let decision = router.decide("k", Some(&config), true);
        let json = serde_json::to_string(&decision.telemetry).unwrap();
        assert!(!json.contains("very-secret-seed"));
        assert!(!json.contains("seed"));
    }

    #[test]
    fn applied_ratio_tracks_exposure() {
        let router = CanaryRouter::new();
        let on = cfg(100, false);
        let off = cfg(0, false);
        router.decide("a", Some(&on), true);
        router.decide("b", Some(&off), true);
        router.decide("c", Some(&on), true);
        let last = router.decide("d", Some(&off), true);
        assert!((last.telemetry.applied_ratio - 0.5).abs() < 1e-12);
        assert_eq!(router.exposure(), (2, 4));
    }

    #[test]
    fn observe_mode_selects_without_exposure() {
        let router = CanaryRouter::new();
        let on = cfg(100, false);
        for key in ["a", "b", "c"] {
            let decision = router.decide_in(Mode::Observe, key, Some(&on), true);
            assert!(decision.selected);
            assert!(!decision.apply);
            assert_eq!(decision.reason_code, ReasonCode::CanarySelected);
            assert!(!decision.telemetry.applied);
            assert_eq!(decision.telemetry.applied_ratio, 0.0);
            assert_eq!(
                decision.telemetry.blocked_reason_code,
                Some(ReasonCode::ObserveOnly)
            );
        }
        assert_eq!(router.exposure(), (0, 3));

        // Refusals keep their own reason in observe mode.
        let refused = router.decide_in(Mode::Observe, "d", Some(&cfg(100, true)), true);
        assert!(!refused.selected);
        assert_eq!(
            refused.telemetry.blocked_reason_code,
            Some(ReasonCode::KillSwitchOn)
        );

        let enforced = router.decide_in(Mode::Enforce, "e", Some(&on), true);
        assert!(enforced.apply);
        assert!(enforced.telemetry.applied);
        assert_eq!(router.exposure(), (1, 5));
    }

    #[test]
    fn concurrent_decisions_are_counted() {
        let router = CanaryRouter::new();
        let on = cfg(100, false);
        std::thread::scope(|scope| {
            for t in 0..4 {
                let router = &router;
                let on = &on;
                scope.spawn(move || {
                    for i in 0..250 {
                        router.decide(&format!("{t}-{i}"), Some(on), true);
                    }
                });
            }
        });
        assert_eq!(router.exposure(), (1_000, 1_000));
    }
}
