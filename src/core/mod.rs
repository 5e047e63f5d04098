//! Core types: errors, reason codes, modes, settings and versioned artifacts.

pub mod canary_config;
pub mod config_store;
pub mod errors;
pub mod mode;
pub mod reason;
pub mod settings;
pub mod thresholds;
