//! Canonical view, near-tie grouping and swap budgeting.
//!
//! Input order is not trusted: everything operates on a canonical order
//! (`-primary_score`, `doc_id`, original index), so the plan for a list does
//! not depend on how the retriever happened to order ties.

use crate::core::reason::ReasonCode;
use crate::tiebreak::candidate::RankedCandidate;

/// Hard ceiling on realized reorderings per request.
pub const MAX_SWAPS_CEILING: usize = 3;

/// Swap budget for a top-K window: `min(3, floor(K / 10))`.
#[must_use]
pub const fn swap_budget(k: usize) -> usize {
    let tenth = k / 10;
    if tenth < MAX_SWAPS_CEILING {
        tenth
    } else {
        MAX_SWAPS_CEILING
    }
}

/// Indices into `ranked` in canonical order.
///
/// Fails with `PRIMARY_MISSING` if any primary score is absent or non-finite.
pub fn canonical_order(ranked: &[RankedCandidate]) -> Result<Vec<usize>, ReasonCode> {
    let primaries: Vec<f64> = ranked
        .iter()
        .map(RankedCandidate::finite_primary)
        .collect::<Option<_>>()
        .ok_or(ReasonCode::PrimaryMissing)?;

    let mut order: Vec<usize> = (0..ranked.len()).collect();
    order.sort_by(|&a, &b| {
        primaries[b]
            .total_cmp(&primaries[a])
            .then_with(|| ranked[a].doc_id.cmp(&ranked[b].doc_id))
            .then_with(|| a.cmp(&b))
    });
    Ok(order)
}

/// One maximal run of near-tied neighbours in the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NearTieGroup {
    /// First window position of the group.
    pub start: usize,
    /// Window positions in their proposed order: `reordered[j]` is the
    /// position whose candidate moves to `start + j`.
    pub reordered: Vec<usize>,
    /// Whether the proposed order differs from the canonical one.
    pub changes_order: bool,
    /// Whether this group would be realized under the plan's budget.
    pub within_budget: bool,
}

impl NearTieGroup {
    /// Number of members (always at least 2).
    #[must_use]
    pub fn len(&self) -> usize {
        self.reordered.len()
    }

    /// Groups are never empty; provided for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reordered.is_empty()
    }

    /// `(from, to)` window positions of every member that moves.
    pub fn moves(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.reordered
            .iter()
            .enumerate()
            .map(|(offset, &from)| (from, self.start + offset))
            .filter(|(from, to)| from != to)
    }
}

/// The proposed reordering of one ranked list.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapPlan {
    /// Indices into the input, canonical order (whole list).
    pub canonical: Vec<usize>,
    /// `min(k, len)`.
    pub window_size: usize,
    /// Near-tie groups in window order.
    pub groups: Vec<NearTieGroup>,
    /// Effective budget, never above [`MAX_SWAPS_CEILING`].
    pub max_swaps: usize,
}

impl SwapPlan {
    /// Number of groups whose reordering changes positions.
    #[must_use]
    pub fn proposed_swap_count(&self) -> usize {
        self.groups.iter().filter(|g| g.changes_order).count()
    }

    /// Number of groups realized under the budget.
    #[must_use]
    pub fn realized_swap_count(&self) -> usize {
        self.groups.iter().filter(|g| g.within_budget).count()
    }

    /// More changing groups than the budget allows.
    #[must_use]
    pub fn budget_hit(&self) -> bool {
        self.proposed_swap_count() > self.max_swaps
    }

    /// Input indices in the order obtained by applying the selected groups
    /// to the canonical order.
    #[must_use]
    pub fn order_with<F>(&self, mut select: F) -> Vec<usize>
    where
        F: FnMut(&NearTieGroup) -> bool,
    {
        let mut order = self.canonical.clone();
        for group in self.groups.iter().filter(|g| select(g)) {
            for (offset, &from) in group.reordered.iter().enumerate() {
                order[group.start + offset] = self.canonical[from];
            }
        }
        order
    }
}

/// Build the swap plan for `ranked`.
///
/// Neighbours in the canonical window whose primary gap is at most
/// `gap_threshold` join a group. Each group is reordered by
/// (`-secondary_score`, `doc_id`); non-finite secondaries sort last. Changing
/// groups are marked within budget left to right until `max_swaps` is used.
/// `max_swaps` is capped at [`MAX_SWAPS_CEILING`] whatever the caller asks.
pub fn plan(
    ranked: &[RankedCandidate],
    k: usize,
    gap_threshold: f64,
    max_swaps: usize,
) -> Result<SwapPlan, ReasonCode> {
    let max_swaps = max_swaps.min(MAX_SWAPS_CEILING);
    let canonical = canonical_order(ranked)?;
    let window_size = k.min(canonical.len());
    let primary = |pos: usize| ranked[canonical[pos]].finite_primary().unwrap_or(0.0);

    let mut groups = Vec::new();
    let mut budget_left = max_swaps;
    let mut start = 0;
    while start < window_size {
        let mut end = start + 1;
        while end < window_size && primary(end - 1) - primary(end) <= gap_threshold {
            end += 1;
        }
        if end - start >= 2 {
            let mut reordered: Vec<usize> = (start..end).collect();
            reordered.sort_by(|&a, &b| {
                let (ca, cb) = (&ranked[canonical[a]], &ranked[canonical[b]]);
                secondary_key(cb)
                    .total_cmp(&secondary_key(ca))
                    .then_with(|| ca.doc_id.cmp(&cb.doc_id))
                    .then_with(|| a.cmp(&b))
            });
            let changes_order = reordered.iter().enumerate().any(|(i, &p)| p != start + i);
            let within_budget = changes_order && budget_left > 0;
            if within_budget {
                budget_left -= 1;
            }
            groups.push(NearTieGroup {
                start,
                reordered,
                changes_order,
                within_budget,
            });
        }
        start = end;
    }

    Ok(SwapPlan {
        canonical,
        window_size,
        groups,
        max_swaps,
    })
}

fn secondary_key(candidate: &RankedCandidate) -> f64 {
    if candidate.secondary_score.is_finite() {
        candidate.secondary_score
    } else {
        f64::NEG_INFINITY
    }
}
