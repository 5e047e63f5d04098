//! Near-tie reordering of the top-K window by a secondary signal.

pub mod candidate;
pub mod engine;
pub mod plan;

#[cfg(test)]
mod test_properties;
