//! Canary routing: stable request bucketing and eligibility.

pub mod router;
