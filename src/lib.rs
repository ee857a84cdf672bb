//! Library exports for payid-metrics, shared between the binary and tests.

pub mod config;
pub mod metrics;
pub mod startup;
pub mod utils;
