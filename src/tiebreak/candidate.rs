//! Retriever output: one scored document.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A ranked document as handed over by the retriever.
///
/// `primary_score` is optional on the wire so that a missing score can be
/// reported as `PRIMARY_MISSING` instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// Retriever score; ranks and gates.
    #[serde(default)]
    pub primary_score: Option<f64>,
    /// Tie-break key inside a near-tie group.
    #[serde(default)]
    pub secondary_score: f64,
    /// Opaque document identifier.
    pub doc_id: String,
    /// Matched terms. Carried through, never logged.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub term_set: BTreeSet<String>,
}

impl RankedCandidate {
    /// Candidate with an empty term set.
    #[must_use]
    pub fn new(primary_score: f64, secondary_score: f64, doc_id: impl Into<String>) -> Self {
        Self {
            primary_score: Some(primary_score),
            secondary_score,
            doc_id: doc_id.into(),
            term_set: BTreeSet::new(),
        }
    }

    /// Attach matched terms.
    #[must_use]
    pub fn with_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.term_set = terms.into_iter().map(Into::into).collect();
        self
    }

    /// Primary score when present and finite.
    #[must_use]
    pub fn finite_primary(&self) -> Option<f64> {
        self.primary_score.filter(|score| score.is_finite())
    }
}
