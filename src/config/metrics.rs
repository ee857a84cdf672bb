use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Push gateway used when the operator does not configure one.
pub const DEFAULT_GATEWAY_URL: &str = "https://push00.mon.payid.tech/";
pub const DEFAULT_PUSH_INTERVAL_IN_SECONDS: f64 = 15.0;
pub const DEFAULT_COUNT_REFRESH_INTERVAL_IN_SECONDS: f64 = 60.0;

/// Identity and tunables for the metrics exporter.
///
/// Nothing is validated here. Fields may be overridden after construction and
/// are checked by [`crate::metrics::MetricsService::is_push_enabled`] each
/// time pushing is scheduled.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct MetricsConfiguration {
    /// Unique identifier of this process across the deployment, e.g. hostname + '_' + pid.
    pub tag: String,

    /// Individual or organization operating this PayID server.
    /// Used as the `org` label and as part of the push grouping key.
    pub organization: String,

    /// Base URL of the Prometheus push gateway.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// How frequently (in seconds) metrics are pushed to the gateway.
    #[serde(default = "default_push_interval")]
    pub push_interval_in_seconds: f64,

    /// How frequently (in seconds) the external job should refresh identifier counts.
    #[serde(default = "default_count_refresh_interval")]
    pub count_refresh_interval_in_seconds: f64,
}

impl MetricsConfiguration {
    pub fn new(tag: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            organization: organization.into(),
            gateway_url: default_gateway_url(),
            push_interval_in_seconds: default_push_interval(),
            count_refresh_interval_in_seconds: default_count_refresh_interval(),
        }
    }
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_push_interval() -> f64 {
    DEFAULT_PUSH_INTERVAL_IN_SECONDS
}

fn default_count_refresh_interval() -> f64 {
    DEFAULT_COUNT_REFRESH_INTERVAL_IN_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fills_documented_defaults() {
        let config = MetricsConfiguration::new("tag1", "payburner.com");
        assert_eq!(config.tag, "tag1");
        assert_eq!(config.organization, "payburner.com");
        assert_eq!(config.gateway_url, "https://push00.mon.payid.tech/");
        assert_eq!(config.push_interval_in_seconds, 15.0);
        assert_eq!(config.count_refresh_interval_in_seconds, 60.0);
    }

    #[test]
    fn deserializing_applies_the_same_defaults() {
        let config: MetricsConfiguration = serde_json::from_value(serde_json::json!({
            "tag": "host_42",
            "organization": "example.org",
        }))
        .unwrap();
        assert_eq!(config, MetricsConfiguration::new("host_42", "example.org"));
    }

    #[test]
    fn fields_can_be_overridden_without_validation() {
        let mut config = MetricsConfiguration::new("tag1", "");
        config.gateway_url = String::new();
        config.push_interval_in_seconds = -5.0;
        assert_eq!(config.push_interval_in_seconds, -5.0);
        assert!(config.gateway_url.is_empty());
    }
}
