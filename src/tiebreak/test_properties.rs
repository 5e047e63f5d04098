//! Property-based tests for tie-break invariants.
//!
//! Arbitrary candidate lists (coarse primaries so that ties are common,
//! unique doc ids) must keep the engine deterministic, order-insensitive,
//! permutation-preserving and within its swap budget.

use std::collections::BTreeSet;

use proptest::prelude::*;

use super::candidate::RankedCandidate;
use super::engine::{EvalContext, apply, simulate};
use super::plan::{MAX_SWAPS_CEILING, swap_budget};
use crate::canary::router::canary_bucket;

// ──────────────────── strategies ────────────────────

fn arb_ranked() -> impl Strategy<Value = Vec<RankedCandidate>> {
    prop::collection::vec((0u8..6, 0.0f64..1.0), 0..40).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (p, s))| RankedCandidate::new(f64::from(p), s, format!("d{i:02}")))
            .collect()
    })
}

fn arb_shuffled_pair() -> impl Strategy<Value = (Vec<RankedCandidate>, Vec<RankedCandidate>)> {
    arb_ranked().prop_flat_map(|ranked| (Just(ranked.clone()), Just(ranked).prop_shuffle()))
}

fn doc_ids(ranked: &[RankedCandidate]) -> Vec<String> {
    ranked.iter().map(|c| c.doc_id.clone()).collect()
}

// ──────────────────── properties ────────────────────

proptest! {
    #[test]
    fn simulate_is_deterministic(ranked in arb_ranked(), k in 1usize..30, gap in 0.0f64..2.0) {
        let a = simulate(&ranked, k, gap, EvalContext::default());
        let b = simulate(&ranked, k, gap, EvalContext::default());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn simulate_ignores_input_order(
        (ranked, shuffled) in arb_shuffled_pair(),
        k in 1usize..30,
        gap in 0.0f64..2.0,
    ) {
        let relevant: BTreeSet<String> =
            ranked.iter().step_by(3).map(|c| c.doc_id.clone()).collect();
        let ctx = EvalContext::new(Some(&relevant), None);
        prop_assert_eq!(simulate(&ranked, k, gap, ctx), simulate(&shuffled, k, gap, ctx));
    }

    #[test]
    fn simulate_never_applies(ranked in arb_ranked(), k in 1usize..30, gap in 0.0f64..2.0) {
        let counts = simulate(&ranked, k, gap, EvalContext::default()).unwrap();
        prop_assert_eq!(counts.applied_swap_count, 0);
        prop_assert!(counts.window_size <= k);
        prop_assert_eq!(counts.budget_hit, counts.proposed_swap_count > counts.max_swaps);
    }

    #[test]
    fn apply_preserves_the_document_multiset(
        ranked in arb_ranked(),
        k in 1usize..30,
        gap in 0.0f64..2.0,
        budget in 0usize..5,
    ) {
        let (out, _) = apply(&ranked, k, gap, budget, EvalContext::default()).unwrap();
        let mut before = doc_ids(&ranked);
        let mut after = doc_ids(&out);
        before.sort();
        after.sort();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn apply_respects_the_budget(
        ranked in arb_ranked(),
        k in 1usize..30,
        gap in 0.0f64..2.0,
        budget in 0usize..8,
    ) {
        let (_, counts) = apply(&ranked, k, gap, budget, EvalContext::default()).unwrap();
        prop_assert!(counts.applied_swap_count <= budget);
        prop_assert!(counts.applied_swap_count <= MAX_SWAPS_CEILING);
        prop_assert!(counts.applied_swap_count <= counts.proposed_swap_count);

        let (_, counts) =
            apply(&ranked, k, gap, swap_budget(k), EvalContext::default()).unwrap();
        prop_assert!(counts.applied_swap_count <= 3);
        prop_assert!(counts.applied_swap_count <= k / 10);
    }

    #[test]
    fn apply_leaves_the_tail_alone(
        ranked in arb_ranked(),
        k in 1usize..30,
        gap in 0.0f64..2.0,
    ) {
        let (out, counts) = apply(&ranked, k, gap, 3, EvalContext::default()).unwrap();
        if counts.applied_swap_count == 0 {
            prop_assert_eq!(doc_ids(&out), doc_ids(&ranked));
        } else {
            // Beyond the window the result follows descending primary score.
            let tail: Vec<f64> = out
                .iter()
                .skip(k)
                .filter_map(RankedCandidate::finite_primary)
                .collect();
            prop_assert!(tail.windows(2).all(|w| w[0] >= w[1]));
        }
    }

    #[test]
    fn bucket_is_always_below_one_hundred(key in ".{0,64}") {
        prop_assert!(canary_bucket(&key) < 100);
    }
}
