//! PayID metrics: instruments, recording interface and push gateway export.
//!
//! Lookups are counted and identifier totals gauged in two separate
//! Prometheus registries, so each can be pushed to its own grouping key.

mod gateway;
mod recorder;
mod service;

pub use gateway::{PushError, PushGateway, PushMode};
pub use recorder::{LookupResult, MetricsRecorder, NULL_ENVIRONMENT, UNKNOWN_LABEL};
pub use service::{
    MetricsService, IDENTIFIER_JOB_NAME, IDENTIFIER_METRIC_NAME, LOOKUP_JOB_NAME,
    LOOKUP_METRIC_NAME,
};
