//! Shadow (`simulate`) and canary (`apply`) tie-break execution.
//!
//! Both variants run the same [`plan`]; they differ only in which groups are
//! realized. `simulate` never touches the ranking and reports what would move
//! if every changing group were applied. `apply` realizes at most `max_swaps`
//! changing groups, left to right, and otherwise returns the input untouched.
//!
//! Output is counts only: no document ids, no scores, no term strings.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::reason::ReasonCode;
use crate::tiebreak::candidate::RankedCandidate;
use crate::tiebreak::plan::{NearTieGroup, SwapPlan, plan, swap_budget};

/// Meta-only counters for one tie-break run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountsOnly {
    /// `min(k, len)`.
    pub window_size: usize,
    /// Near-tie groups in the window, changing or not.
    pub near_tie_group_count: usize,
    /// Groups whose reordering changes positions.
    pub proposed_swap_count: usize,
    /// Groups actually realized (always 0 in shadow mode).
    pub applied_swap_count: usize,
    /// Documents moved to a better position.
    pub moved_up_count: usize,
    /// Documents moved to a worse position.
    pub moved_down_count: usize,
    /// Moved up and labelled relevant.
    pub relevant_moved_up_count: usize,
    /// Moved down and labelled relevant.
    pub relevant_moved_down_count: usize,
    /// Window documents whose resulting position differs from the baseline.
    pub baseline_displaced_count: usize,
    /// Effective budget in groups.
    pub max_swaps: usize,
    /// More changing groups than the budget.
    pub budget_hit: bool,
}

/// Optional evaluation context: relevance labels and a reference ranking.
///
/// Used for counters only; never influences the reordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalContext<'a> {
    /// Doc ids labelled relevant.
    pub relevant_ids: Option<&'a BTreeSet<String>>,
    /// Reference ranking as doc ids.
    pub baseline_order: Option<&'a [String]>,
}

impl<'a> EvalContext<'a> {
    /// Context from optional labels and baseline.
    #[must_use]
    pub fn new(
        relevant_ids: Option<&'a BTreeSet<String>>,
        baseline_order: Option<&'a [String]>,
    ) -> Self {
        Self {
            relevant_ids,
            baseline_order,
        }
    }
}

/// Plan under the budget `swap_budget(k)`.
pub fn plan_for(
    ranked: &[RankedCandidate],
    k: usize,
    gap_threshold: f64,
) -> Result<SwapPlan, ReasonCode> {
    plan(ranked, k, gap_threshold, swap_budget(k))
}

/// Shadow run: count what the tie-break would do, change nothing.
pub fn simulate(
    ranked: &[RankedCandidate],
    k: usize,
    gap_threshold: f64,
    ctx: EvalContext<'_>,
) -> Result<CountsOnly, ReasonCode> {
    let plan = plan_for(ranked, k, gap_threshold)?;
    let order = plan.order_with(|g| g.changes_order);
    let mut counts = tally(&plan, ranked, &order, |g| g.changes_order, ctx);
    counts.applied_swap_count = 0;
    Ok(counts)
}

/// Canary run: realize at most `max_swaps` changing groups, never more than
/// [`MAX_SWAPS_CEILING`](crate::tiebreak::plan::MAX_SWAPS_CEILING).
///
/// If nothing is realized the input is returned unchanged, in its original
/// order. Otherwise the result is the canonical window with the realized
/// groups reordered, followed by the canonical tail beyond `k`.
pub fn apply(
    ranked: &[RankedCandidate],
    k: usize,
    gap_threshold: f64,
    max_swaps: usize,
    ctx: EvalContext<'_>,
) -> Result<(Vec<RankedCandidate>, CountsOnly), ReasonCode> {
    let plan = plan(ranked, k, gap_threshold, max_swaps)?;

    if plan.realized_swap_count() == 0 {
        let identity: Vec<usize> = (0..ranked.len()).collect();
        let counts = tally(&plan, ranked, &identity, |_| false, ctx);
        return Ok((ranked.to_vec(), counts));
    }

    let order = plan.order_with(|g| g.within_budget);
    let counts = tally(&plan, ranked, &order, |g| g.within_budget, ctx);
    let output = order.iter().map(|&i| ranked[i].clone()).collect();
    Ok((output, counts))
}

/// Count moves over the selected groups and baseline displacement over the
/// resulting window order.
fn tally<F>(
    plan: &SwapPlan,
    ranked: &[RankedCandidate],
    order: &[usize],
    mut selected: F,
    ctx: EvalContext<'_>,
) -> CountsOnly
where
    F: FnMut(&NearTieGroup) -> bool,
{
    let mut counts = CountsOnly {
        window_size: plan.window_size,
        near_tie_group_count: plan.groups.len(),
        proposed_swap_count: plan.proposed_swap_count(),
        max_swaps: plan.max_swaps,
        budget_hit: plan.budget_hit(),
        ..CountsOnly::default()
    };

    let is_relevant = |pos: usize| {
        ctx.relevant_ids
            .is_some_and(|ids| ids.contains(&ranked[plan.canonical[pos]].doc_id))
    };

    for group in plan.groups.iter().filter(|g| selected(g)) {
        counts.applied_swap_count += 1;
        for (from, to) in group.moves() {
            let relevant = is_relevant(from);
            if to < from {
                counts.moved_up_count += 1;
                counts.relevant_moved_up_count += usize::from(relevant);
            } else {
                counts.moved_down_count += 1;
                counts.relevant_moved_down_count += usize::from(relevant);
            }
        }
    }

    if let Some(baseline) = ctx.baseline_order {
        let mut baseline_pos: HashMap<&str, usize> = HashMap::with_capacity(baseline.len());
        for (pos, id) in baseline.iter().enumerate() {
            baseline_pos.entry(id.as_str()).or_insert(pos);
        }
        counts.baseline_displaced_count = order
            .iter()
            .take(plan.window_size)
            .enumerate()
            .filter(|(pos, idx)| {
                baseline_pos
                    .get(ranked[**idx].doc_id.as_str())
                    .is_some_and(|base| base != pos)
            })
            .count();
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(rows: &[(f64, f64, &str)]) -> Vec<RankedCandidate> {
        rows.iter()
            .map(|(p, s, id)| RankedCandidate::new(*p, *s, *id))
            .collect()
    }

    fn ids(ranked: &[RankedCandidate]) -> Vec<&str> {
        ranked.iter().map(|c| c.doc_id.as_str()).collect()
    }

    #[test]
    fn zero_budget_returns_input_unchanged() {
        let ranked = docs(&[(5.0, 0.5, "d1"), (5.0, 0.3, "d2"), (4.0, 0.0, "d3")]);
        let (out, counts) = apply(&ranked, 3, 0.0, 0, EvalContext::default()).unwrap();
        assert_eq!(ids(&out), ["d1", "d2", "d3"]);
        assert_eq!(counts.applied_swap_count, 0);
    }

    #[test]
    fn group_already_in_secondary_order_is_a_noop() {
        let ranked = docs(&[(5.0, 0.5, "d1"), (5.0, 0.3, "d2"), (4.0, 0.0, "d3")]);
        let (out, counts) = apply(&ranked, 3, 0.0, 1, EvalContext::default()).unwrap();
        assert_eq!(ids(&out), ["d1", "d2", "d3"]);
        assert_eq!(counts.near_tie_group_count, 1);
        assert_eq!(counts.proposed_swap_count, 0);
    }

    #[test]
    fn reversed_secondaries_swap_within_budget() {
        let ranked = docs(&[(5.0, 0.3, "d1"), (5.0, 0.5, "d2"), (4.0, 0.0, "d3")]);
        let (out, counts) = apply(&ranked, 3, 0.0, 1, EvalContext::default()).unwrap();
        assert_eq!(ids(&out), ["d2", "d1", "d3"]);
        assert_eq!(counts.applied_swap_count, 1);
        assert_eq!(counts.moved_up_count, 1);
        assert_eq!(counts.moved_down_count, 1);
    }

    #[test]
    fn small_window_has_no_budget_in_pipeline_plan() {
        let ranked = docs(&[
            (5.0, 0.1, "a"),
            (5.0, 0.9, "b"),
            (4.0, 0.1, "c"),
            (4.0, 0.9, "d"),
            (3.0, 0.5, "e"),
        ]);
        let budget = swap_budget(5);
        assert_eq!(budget, 0);
        let (out, counts) = apply(&ranked, 5, 0.0, budget, EvalContext::default()).unwrap();
        assert_eq!(out, ranked);
        assert_eq!(counts.proposed_swap_count, 2);
        assert!(counts.budget_hit);
    }

    #[test]
    fn unrealized_apply_preserves_untrusted_input_order() {
        // Not canonical: a lower score first. Nothing realizes, so the caller
        // gets exactly what it sent.
        let ranked = docs(&[(1.0, 0.0, "z"), (9.0, 0.0, "a")]);
        let (out, _) = apply(&ranked, 2, 0.0, 3, EvalContext::default()).unwrap();
        assert_eq!(out, ranked);
    }

    #[test]
    fn realized_output_is_canonical_window_plus_tail() {
        let ranked = docs(&[
            (1.0, 0.0, "tail"),
            (9.0, 0.1, "a"),
            (9.0, 0.9, "b"),
            (5.0, 0.0, "c"),
        ]);
        let (out, _) = apply(&ranked, 3, 0.0, 1, EvalContext::default()).unwrap();
        assert_eq!(ids(&out), ["b", "a", "c", "tail"]);
    }

    #[test]
    fn budget_caps_realized_groups() {
        let ranked = docs(&[
            (9.0, 0.1, "a"),
            (9.0, 0.9, "b"),
            (5.0, 0.1, "c"),
            (5.0, 0.9, "d"),
        ]);
        let (out, counts) = apply(&ranked, 4, 0.0, 1, EvalContext::default()).unwrap();
        assert_eq!(ids(&out), ["b", "a", "c", "d"]);
        assert_eq!(counts.proposed_swap_count, 2);
        assert_eq!(counts.applied_swap_count, 1);
        assert!(counts.budget_hit);
    }

    #[test]
    fn oversized_budget_never_realizes_more_than_three_groups() {
        let ranked = docs(&[
            (9.0, 0.1, "a1"),
            (9.0, 0.9, "a2"),
            (8.0, 0.1, "b1"),
            (8.0, 0.9, "b2"),
            (7.0, 0.1, "c1"),
            (7.0, 0.9, "c2"),
            (6.0, 0.1, "d1"),
            (6.0, 0.9, "d2"),
            (5.0, 0.1, "e1"),
            (5.0, 0.9, "e2"),
        ]);
        let (out, counts) = apply(&ranked, 10, 0.0, 5, EvalContext::default()).unwrap();
        assert_eq!(counts.proposed_swap_count, 5);
        assert_eq!(counts.applied_swap_count, 3);
        assert_eq!(counts.max_swaps, 3);
        assert!(counts.budget_hit);
        assert_eq!(
            ids(&out),
            ["a2", "a1", "b2", "b1", "c2", "c1", "d1", "d2", "e1", "e2"]
        );
    }

    #[test]
    fn simulate_counts_all_changing_groups() {
        let ranked = docs(&[
            (9.0, 0.1, "a"),
            (9.0, 0.9, "b"),
            (5.0, 0.1, "c"),
            (5.0, 0.9, "d"),
        ]);
        let relevant: BTreeSet<String> = ["b".to_string(), "c".to_string()].into();
        let counts = simulate(&ranked, 4, 0.0, EvalContext::new(Some(&relevant), None)).unwrap();
        assert_eq!(counts.window_size, 4);
        assert_eq!(counts.near_tie_group_count, 2);
        assert_eq!(counts.proposed_swap_count, 2);
        assert_eq!(counts.applied_swap_count, 0);
        assert_eq!(counts.moved_up_count, 2);
        assert_eq!(counts.moved_down_count, 2);
        assert_eq!(counts.relevant_moved_up_count, 1);
        assert_eq!(counts.relevant_moved_down_count, 1);
        assert_eq!(counts.max_swaps, 0);
        assert!(counts.budget_hit);
    }

    #[test]
    fn baseline_displacement_counts_window_positions() {
        let ranked = docs(&[(9.0, 0.1, "a"), (9.0, 0.9, "b"), (5.0, 0.0, "c")]);
        let baseline = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ctx = EvalContext::new(None, Some(&baseline));
        let (_, applied) = apply(&ranked, 3, 0.0, 1, ctx).unwrap();
        assert_eq!(applied.baseline_displaced_count, 2);

        let (_, untouched) = apply(&ranked, 3, 0.0, 0, ctx).unwrap();
        assert_eq!(untouched.baseline_displaced_count, 0);
    }

    #[test]
    fn primary_missing_propagates() {
        let mut ranked = docs(&[(1.0, 0.0, "a"), (1.0, 0.0, "b")]);
        ranked[0].primary_score = Some(f64::NAN);
        assert_eq!(
            simulate(&ranked, 2, 0.0, EvalContext::default()),
            Err(ReasonCode::PrimaryMissing)
        );
        assert_eq!(
            apply(&ranked, 2, 0.0, 1, EvalContext::default()).map(|(_, c)| c),
            Err(ReasonCode::PrimaryMissing)
        );
    }

    #[test]
    fn empty_and_single_inputs_are_noops() {
        let empty: Vec<RankedCandidate> = Vec::new();
        let (out, counts) = apply(&empty, 10, 0.0, 3, EvalContext::default()).unwrap();
        assert!(out.is_empty());
        assert_eq!(counts.window_size, 0);
        assert_eq!(counts.applied_swap_count, 0);
        assert!(!counts.budget_hit);

        let single = docs(&[(1.0, 0.0, "a")]);
        let counts = simulate(&single, 10, 1.0, EvalContext::default()).unwrap();
        assert_eq!(counts.window_size, 1);
        assert_eq!(counts.near_tie_group_count, 0);
    }

    #[test]
    fn counts_serialize_without_identifiers() {
        let ranked = docs(&[(9.0, 0.1, "secret-doc"), (9.0, 0.9, "other-doc")]);
        let counts = simulate(&ranked, 2, 0.0, EvalContext::default()).unwrap();
        let json = serde_json::to_string(&counts).unwrap();
        assert!(!json.contains("secret-doc"));
        assert!(!json.contains("other-doc"));
    }
}
