//! PayID metrics instruments and the recurring push to the gateway.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use prometheus::core::Collector;
use prometheus::proto::Metric;
use prometheus::{GaugeVec, IntCounterVec, Opts, Registry};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::gateway::{encode_text, parse_gateway_url, PushError, PushGateway, PushMode};
use super::recorder::{LookupResult, MetricsRecorder, NULL_ENVIRONMENT, UNKNOWN_LABEL};
use crate::config::MetricsConfiguration;
use crate::utils::log_throttle::LogThrottle;

/// Push gateway job for the lookup counter.
pub const LOOKUP_JOB_NAME: &str = "payid_counter_metrics";
/// Push gateway job for the identifier gauge.
pub const IDENTIFIER_JOB_NAME: &str = "payid_gauge_metrics";

pub const LOOKUP_METRIC_NAME: &str = "lookup_request_total";
pub const IDENTIFIER_METRIC_NAME: &str = "identifier_count";

const PUSH_FAILURE_LOG_WINDOW: Duration = Duration::from_secs(60);

/// Owns the lookup counter and identifier gauge, each in a private registry,
/// and the timer task that pushes them.
pub struct MetricsService {
    config: Arc<MetricsConfiguration>,
    lookup_registry: Registry,
    identifier_registry: Registry,
    lookup_counter: IntCounterVec,
    identifier_gauge: GaugeVec,
    push_task: Mutex<Option<JoinHandle<()>>>,
    push_failures: Arc<LogThrottle>,
}

impl MetricsService {
    pub fn new(config: Arc<MetricsConfiguration>) -> Self {
        let lookup_registry = Registry::new();
        let identifier_registry = Registry::new();

        let lookup_counter = IntCounterVec::new(
            Opts::new(LOOKUP_METRIC_NAME, "count of requests to lookup a PayID"),
            &["paymentNetwork", "environment", "org", "result"],
        )
        .expect("Failed to create lookup_request_total");
        lookup_registry
            .register(Box::new(lookup_counter.clone()))
            .expect("Failed to register lookup_request_total");

        let identifier_gauge = GaugeVec::new(
            Opts::new(IDENTIFIER_METRIC_NAME, "count of total PayIDs"),
            &["paymentNetwork", "environment", "org"],
        )
        .expect("Failed to create identifier_count");
        identifier_registry
            .register(Box::new(identifier_gauge.clone()))
            .expect("Failed to register identifier_count");

        Self {
            config,
            lookup_registry,
            identifier_registry,
            lookup_counter,
            identifier_gauge,
            push_task: Mutex::new(None),
            push_failures: Arc::new(LogThrottle::new(PUSH_FAILURE_LOG_WINDOW)),
        }
    }

    pub fn config(&self) -> &MetricsConfiguration {
        &self.config
    }

    /// Checks whether the configuration allows pushing, logging the first reason it does not.
    pub fn is_push_enabled(&self) -> bool {
        if self.config.gateway_url.is_empty() {
            warn!("gateway_url must be set for metrics to be pushed. Metrics will not be pushed.");
            return false;
        }

        if let Err(e) = parse_gateway_url(&self.config.gateway_url) {
            warn!("{}. Metrics will not be pushed.", e);
            return false;
        }

        if self.config.organization.is_empty() {
            warn!("organization must be set for metrics to be pushed. Metrics will not be pushed.");
            return false;
        }

        if push_period(self.config.push_interval_in_seconds).is_none() {
            warn!(
                "Invalid push_interval_in_seconds value: {}. Metrics will not be pushed.",
                self.config.push_interval_in_seconds
            );
            return false;
        }

        true
    }

    /// Starts pushing both registries every `push_interval_in_seconds`.
    ///
    /// Does nothing when pushing is disabled. Calling it again replaces the
    /// running timer. Must be called from within a tokio runtime.
    pub fn schedule_recurring_metrics_push(&self) {
        if !self.is_push_enabled() {
            return;
        }
        let Some(period) = push_period(self.config.push_interval_in_seconds) else {
            return;
        };

        let mut push_task = self.lock_push_task();
        if let Some(previous) = push_task.take() {
            debug!("Cancelling previously scheduled metrics push");
            previous.abort();
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!("Cannot schedule metrics push outside a tokio runtime: {}", e);
                return;
            }
        };

        let targets = match self.push_targets() {
            Ok(targets) => targets,
            Err(e) => {
                error!("Failed to create push gateway: {}", e);
                return;
            }
        };

        let throttle = self.push_failures.clone();
        let task = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                for target in &targets {
                    tokio::spawn(target.clone().fire(throttle.clone()));
                }
            }
        });

        info!(
            gateway_url = self.config.gateway_url.as_str(),
            interval_seconds = self.config.push_interval_in_seconds,
            "Scheduled recurring metrics push"
        );
        *push_task = Some(task);
    }

    /// Whether a push timer is currently installed and running.
    pub fn is_push_scheduled(&self) -> bool {
        self.lock_push_task()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Current value of the lookup counter for one series, zero if never incremented.
    pub fn lookup_count(
        &self,
        payment_network: &str,
        environment: &str,
        result: LookupResult,
    ) -> u64 {
        let labels = [
            ("paymentNetwork", payment_network),
            ("environment", environment),
            ("org", self.config.organization.as_str()),
            ("result", result.as_str()),
        ];
        find_sample(&self.lookup_counter, &labels)
            .map(|m| m.get_counter().get_value() as u64)
            .unwrap_or(0)
    }

    /// Current gauge value for one series, `None` if never set.
    pub fn identifier_count(&self, payment_network: &str, environment: &str) -> Option<f64> {
        let labels = [
            ("paymentNetwork", payment_network),
            ("environment", environment),
            ("org", self.config.organization.as_str()),
        ];
        find_sample(&self.identifier_gauge, &labels).map(|m| m.get_gauge().get_value())
    }

    /// Text exposition of the lookup counter registry, as pushed to the gateway.
    pub fn render_lookup_metrics(&self) -> Result<String, prometheus::Error> {
        render(&self.lookup_registry)
    }

    /// Text exposition of the identifier gauge registry, as pushed to the gateway.
    pub fn render_identifier_metrics(&self) -> Result<String, prometheus::Error> {
        render(&self.identifier_registry)
    }

    fn push_targets(&self) -> Result<[PushTarget; 2], PushError> {
        let organization = self.config.organization.as_str();
        Ok([
            // Counts are additive: every server contributes to the running totals.
            PushTarget {
                gateway: PushGateway::new(&self.config.gateway_url, self.lookup_registry.clone())?,
                mode: PushMode::Add,
                job: LOOKUP_JOB_NAME,
                instance: format!("{}_{}", organization, self.config.tag),
                instrument: "counter",
            },
            // Only the current count matters, so the last push wins.
            PushTarget {
                gateway: PushGateway::new(
                    &self.config.gateway_url,
                    self.identifier_registry.clone(),
                )?,
                mode: PushMode::Replace,
                job: IDENTIFIER_JOB_NAME,
                instance: organization.to_string(),
                instrument: "gauge",
            },
        ])
    }

    fn lock_push_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.push_task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl MetricsRecorder for MetricsService {
    fn record_lookup_bad_accept_header(&self) {
        self.lookup_counter
            .with_label_values(&[
                UNKNOWN_LABEL,
                UNKNOWN_LABEL,
                self.config.organization.as_str(),
                LookupResult::BadAcceptHeader.as_str(),
            ])
            .inc();
    }

    fn set_identifier_count(&self, payment_network: &str, environment: &str, count: f64) {
        self.identifier_gauge
            .with_label_values(&[payment_network, environment, self.config.organization.as_str()])
            .set(count);
    }

    fn record_lookup_result(&self, found: bool, payment_network: &str, environment: Option<&str>) {
        self.lookup_counter
            .with_label_values(&[
                payment_network,
                environment.unwrap_or(NULL_ENVIRONMENT),
                self.config.organization.as_str(),
                LookupResult::from_found(found).as_str(),
            ])
            .inc();
    }
}

impl Drop for MetricsService {
    fn drop(&mut self) {
        if let Some(task) = self.lock_push_task().take() {
            task.abort();
        }
    }
}

/// One registry pushed to one grouping key on every tick.
#[derive(Clone)]
struct PushTarget {
    gateway: PushGateway,
    mode: PushMode,
    job: &'static str,
    instance: String,
    instrument: &'static str,
}

impl PushTarget {
    async fn fire(self, throttle: Arc<LogThrottle>) {
        match self.gateway.send(self.mode, self.job, &self.instance).await {
            Ok(()) => debug!(
                job = self.job,
                instance = self.instance.as_str(),
                "{} metrics pushed",
                self.instrument
            ),
            Err(e) => {
                if let Some(suppressed_count) = throttle.should_emit(self.job) {
                    error!(
                        job = self.job,
                        instance = self.instance.as_str(),
                        suppressed_count,
                        error = %e,
                        "{} metrics push failed",
                        self.instrument
                    );
                }
            }
        }
    }
}

/// Converts the configured interval to a timer period; `None` when it is not
/// a positive, finite, non-zero duration.
fn push_period(interval_in_seconds: f64) -> Option<Duration> {
    if interval_in_seconds.is_nan() || interval_in_seconds <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(interval_in_seconds)
        .ok()
        .filter(|period| !period.is_zero())
}

fn find_sample<C: Collector>(collector: &C, labels: &[(&str, &str)]) -> Option<Metric> {
    collector
        .collect()
        .into_iter()
        .flat_map(|family| family.get_metric().to_vec())
        .find(|metric| {
            let pairs = metric.get_label();
            pairs.len() == labels.len()
                && labels.iter().all(|(name, value)| {
                    pairs
                        .iter()
                        .any(|pair| pair.get_name() == *name && pair.get_value() == *value)
                })
        })
}

fn render(registry: &Registry) -> Result<String, prometheus::Error> {
    let buffer = encode_text(registry)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
