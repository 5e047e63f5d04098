//! Meta-Guard: distribution-collapse detection and gap statistics.

pub mod collapse;
pub mod distribution;
