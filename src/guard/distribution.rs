//! Gap statistics over a ranked score window.
//!
//! The p25 adjacent gap is the near-tie threshold the tie-break engine uses:
//! "as close as the closest quarter of neighbouring pairs".

#![allow(clippy::cast_precision_loss)]

use serde::Serialize;

/// Diversity band of unique scores in the window (telemetry only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UniqueScoreBucket {
    /// Ratio `< 0.3`.
    LowDiversity,
    /// Ratio in `[0.3, 0.6)`.
    MediumDiversity,
    /// Ratio `>= 0.6`.
    HighDiversity,
}

impl UniqueScoreBucket {
    /// Band for a unique/total ratio.
    #[must_use]
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.3 {
            Self::LowDiversity
        } else if ratio < 0.6 {
            Self::MediumDiversity
        } else {
            Self::HighDiversity
        }
    }
}

/// Gap percentiles and diversity for one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistributionSummary {
    /// 25th percentile of adjacent gaps.
    pub gap_p25: f64,
    /// Median adjacent gap.
    pub gap_p50: f64,
    /// 75th percentile of adjacent gaps.
    pub gap_p75: f64,
    /// Unique scores over window size, banded.
    pub unique_score_bucket: UniqueScoreBucket,
}

impl DistributionSummary {
    /// Summarize `scores` in the order given (canonical window order).
    #[must_use]
    pub fn from_scores(scores: &[f64]) -> Self {
        let gaps = adjacent_gaps(scores);
        Self {
            gap_p25: percentile(&gaps, 0.25),
            gap_p50: percentile(&gaps, 0.50),
            gap_p75: percentile(&gaps, 0.75),
            unique_score_bucket: UniqueScoreBucket::from_ratio(unique_ratio(scores)),
        }
    }
}

/// Absolute differences between neighbouring scores.
#[must_use]
pub fn adjacent_gaps(scores: &[f64]) -> Vec<f64> {
    scores.windows(2).map(|w| (w[0] - w[1]).abs()).collect()
}

/// Percentile with linear interpolation between closest ranks.
///
/// `p` is a fraction in `[0, 1]`; the rank is `(n - 1) · p` over the sorted
/// values. Empty input yields 0.
#[must_use]
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lower = rank.floor();
    let upper = rank.ceil();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (lo, hi) = (lower as usize, upper as usize);
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lower)
}

fn unique_ratio(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup_by(|a, b| a.to_bits() == b.to_bits());
    sorted.len() as f64 / scores.len() as f64
}
