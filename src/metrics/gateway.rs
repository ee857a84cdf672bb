//! Client for the Prometheus push gateway.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use prometheus::{Encoder, Registry, TextEncoder};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode, Url};
use thiserror::Error;
use tracing::debug;

/// Errors raised while pushing a registry to the gateway.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("invalid push gateway url '{0}'")]
    InvalidGatewayUrl(String),

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("error sending request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("push gateway responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// How the gateway should merge a push with what it already holds
/// under the same grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    /// `POST`: add to the series already stored for the grouping key.
    Add,
    /// `PUT`: replace everything stored for the grouping key.
    Replace,
}

impl PushMode {
    fn method(self) -> Method {
        match self {
            PushMode::Add => Method::POST,
            PushMode::Replace => Method::PUT,
        }
    }
}

/// A push destination bound to one registry.
#[derive(Clone)]
pub struct PushGateway {
    client: reqwest::Client,
    base: Url,
    registry: Registry,
}

impl PushGateway {
    pub fn new(gateway_url: &str, registry: Registry) -> Result<Self, PushError> {
        Ok(Self {
            client: reqwest::Client::new(),
            base: parse_gateway_url(gateway_url)?,
            registry,
        })
    }

    /// Replacing push (`PUT`).
    pub async fn push(&self, job: &str, instance: &str) -> Result<(), PushError> {
        self.send(PushMode::Replace, job, instance).await
    }

    /// Additive push (`POST`).
    pub async fn push_add(&self, job: &str, instance: &str) -> Result<(), PushError> {
        self.send(PushMode::Add, job, instance).await
    }

    pub async fn send(&self, mode: PushMode, job: &str, instance: &str) -> Result<(), PushError> {
        let url = grouping_url(&self.base, job, instance)?;
        let encoder = TextEncoder::new();
        let body = encode_text(&self.registry)?;

        debug!(job, instance, method = %mode.method(), "Pushing metrics to {}", url);
        let response = self
            .client
            .request(mode.method(), url)
            .header(CONTENT_TYPE, encoder.format_type())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(PushError::Status { status, body })
        }
    }
}

/// Parses a gateway URL, rejecting URLs that cannot carry a path.
pub fn parse_gateway_url(gateway_url: &str) -> Result<Url, PushError> {
    match Url::parse(gateway_url) {
        Ok(url) if !url.cannot_be_a_base() => Ok(url),
        _ => Err(PushError::InvalidGatewayUrl(gateway_url.to_string())),
    }
}

/// Builds `<base>/metrics/job/<job>/instance/<instance>`.
///
/// Values containing `/` (or empty values) use the gateway's `@base64` label form.
pub fn grouping_url(base: &Url, job: &str, instance: &str) -> Result<Url, PushError> {
    let mut segments = vec!["metrics".to_string()];
    segments.extend(label_segments("job", job));
    segments.extend(label_segments("instance", instance));

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| PushError::InvalidGatewayUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments.iter());
    Ok(url)
}

fn label_segments(name: &str, value: &str) -> [String; 2] {
    if value.is_empty() {
        [format!("{}@base64", name), "=".to_string()]
    } else if value.contains('/') {
        [format!("{}@base64", name), URL_SAFE_NO_PAD.encode(value)]
    } else {
        [name.to_string(), value.to_string()]
    }
}

/// Renders a registry in the Prometheus text exposition format.
pub fn encode_text(registry: &Registry) -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use prometheus::{IntCounter, Opts};

    fn registry_with_counter() -> Registry {
        let registry = Registry::new();
        let counter = IntCounter::with_opts(Opts::new("pushed_total", "test counter")).unwrap();
        registry.register(Box::new(counter.clone())).unwrap();
        counter.inc_by(3);
        registry
    }

    #[test]
    fn grouping_url_tolerates_trailing_slash() {
        let base = parse_gateway_url("https://push00.mon.payid.tech/").unwrap();
        let url = grouping_url(&base, "payid_gauge_metrics", "payburner.com").unwrap();
        assert_eq!(
            url.as_str(),
            "https://push00.mon.payid.tech/metrics/job/payid_gauge_metrics/instance/payburner.com"
        );
    }

    #[test]
    fn grouping_url_keeps_gateway_path_prefix() {
        let base = parse_gateway_url("http://localhost:9091/gateway").unwrap();
        let url = grouping_url(&base, "job1", "org_tag").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9091/gateway/metrics/job/job1/instance/org_tag"
        );
    }

    #[test]
    fn grouping_url_base64_encodes_slashes_and_empty_values() {
        let base = parse_gateway_url("http://localhost:9091").unwrap();
        let url = grouping_url(&base, "job1", "host/1").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9091/metrics/job/job1/instance@base64/aG9zdC8x"
        );

        let url = grouping_url(&base, "job1", "").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9091/metrics/job/job1/instance@base64/="
        );
    }

    #[test]
    fn rejects_unusable_gateway_urls() {
        assert!(matches!(
            parse_gateway_url(""),
            Err(PushError::InvalidGatewayUrl(_))
        ));
        assert!(matches!(
            parse_gateway_url("mailto:ops@payid.tech"),
            Err(PushError::InvalidGatewayUrl(_))
        ));
    }

    #[tokio::test]
    async fn push_add_posts_text_exposition() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/metrics/job/counter_job/instance/org_tag")
            .match_header("content-type", "text/plain; version=0.0.4")
            .match_body(Matcher::Regex("pushed_total 3".to_string()))
            .with_status(200)
            .create_async()
            .await;

        let gateway = PushGateway::new(&server.url(), registry_with_counter()).unwrap();
        let result = gateway.push_add("counter_job", "org_tag").await;
        m.assert_async().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn push_replaces_with_put() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("PUT", "/metrics/job/gauge_job/instance/org")
            .with_status(202)
            .create_async()
            .await;

        let gateway = PushGateway::new(&server.url(), registry_with_counter()).unwrap();
        let result = gateway.push("gauge_job", "org").await;
        m.assert_async().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("PUT", "/metrics/job/gauge_job/instance/org")
            .with_status(400)
            .with_body("bad metric")
            .create_async()
            .await;

        let gateway = PushGateway::new(&server.url(), registry_with_counter()).unwrap();
        let result = gateway.push("gauge_job", "org").await;
        m.assert_async().await;
        match result {
            Err(PushError::Status { status, body }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "bad metric");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }
}
