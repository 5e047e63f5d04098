#![forbid(unsafe_code)]

//! Guarded Tie-Break (gtb): a fail-closed guard around near-tie reranking.
//!
//! A retriever hands over a ranked candidate list. The guard decides whether
//! the top-K score distribution is healthy, a canary router decides whether
//! this request is exposed, and only then is the order inside near-tie groups
//! refined by a secondary score, under a strict swap budget:
//! 1. **Config store**: frozen thresholds and canary knobs, cached, fail-closed
//! 2. **Collapse detector**: entropy/Gini classification of the score window
//! 3. **Canary router**: deterministic percentage bucketing with a kill switch
//! 4. **Tie-break engine**: shadow `simulate` and budgeted `apply`
//!
//! Every decision emits a meta-only [`telemetry::record::TelemetryRecord`].
//!
//! ```rust,no_run
//! use tiebreak_guard::prelude::*;
//! ```

pub mod prelude;

pub mod canary;
pub mod core;
pub mod guard;
pub mod logger;
pub mod pipeline;
pub mod telemetry;
pub mod tiebreak;
