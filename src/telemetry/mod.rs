//! Meta-only telemetry: the record type and the contract it must satisfy.

pub mod meta_only;
pub mod record;
