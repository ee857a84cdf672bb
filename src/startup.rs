//! Sidecar startup.
//!
//! Builds the metrics service from the loaded configuration, schedules the
//! recurring push and keeps the process alive until it is interrupted.

use std::sync::Arc;
use tracing::info;

use crate::config::ConfigV1;
use crate::metrics::MetricsService;

/// Creates the metrics service and schedules the recurring push.
pub fn start(config: &ConfigV1) -> Arc<MetricsService> {
    let service = Arc::new(MetricsService::new(Arc::new(config.metrics.clone())));

    info!(
        tag = config.metrics.tag.as_str(),
        organization = config.metrics.organization.as_str(),
        count_refresh_interval_seconds = config.metrics.count_refresh_interval_in_seconds,
        "Starting PayID metrics exporter"
    );
    service.schedule_recurring_metrics_push();
    service
}

/// Runs the exporter until ctrl-c.
///
/// # Errors
///
/// Returns an error if the shutdown signal cannot be installed.
pub async fn run(config: Arc<ConfigV1>) -> Result<(), Box<dyn std::error::Error>> {
    let service = start(&config);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping metrics exporter");
    drop(service);

    Ok(())
}
