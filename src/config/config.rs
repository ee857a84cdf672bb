use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use super::metrics::MetricsConfiguration;

/// Prefix for environment variables overriding the config file,
/// e.g. `PAYID_METRICS_METRICS__ORGANIZATION`.
pub const ENV_PREFIX: &str = "PAYID_METRICS_";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    pub metrics: MetricsConfiguration,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Extract a config from any figment, unwrapping the version tag.
pub fn extract_config(figment: &Figment) -> Result<ConfigV1, figment::Error> {
    match figment.extract::<Config>()? {
        Config::ConfigV1(c) => Ok(c),
    }
}

/// Load config from a YAML file, with `PAYID_METRICS_` environment overrides on top.
pub fn load_config(path: impl AsRef<Path>) -> Result<ConfigV1, figment::Error> {
    let figment = Figment::new()
        .merge(Yaml::file(path.as_ref()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));
    extract_config(&figment)
}

/// Print the JSON schema for the configuration to stdout.
pub fn print_schema() -> Result<(), serde_json::Error> {
    let schema = schema_for!(Config);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn loads_yaml_and_applies_env_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r#"
version: "1.0.0"
metrics:
  tag: "host_1"
  organization: "payburner.com"
  push_interval_in_seconds: 30
logging:
  level: "debug"
"#,
            )?;
            jail.set_env("PAYID_METRICS_METRICS__GATEWAY_URL", "http://localhost:9091");

            let config = load_config("config.yaml")?;
            assert_eq!(config.metrics.tag, "host_1");
            assert_eq!(config.metrics.push_interval_in_seconds, 30.0);
            assert_eq!(config.metrics.count_refresh_interval_in_seconds, 60.0);
            assert_eq!(config.metrics.gateway_url, "http://localhost:9091");
            assert_eq!(config.logging.level, "debug");
            assert_eq!(config.logging.format, "console");
            Ok(())
        });
    }

    #[test]
    fn rejects_unknown_version() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r#"
version: "0.9.0"
metrics:
  tag: "host_1"
  organization: "payburner.com"
"#,
            )?;
            assert!(load_config("config.yaml").is_err());
            Ok(())
        });
    }
}
