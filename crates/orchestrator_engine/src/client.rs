use std::time::Duration;

use async_trait::async_trait;
use orchestrator_core::{AnalysisType, FailureSignal};
use reqwest::header::RETRY_AFTER;
use serde_json::Value;
use url::Url;

use crate::TransportError;

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl HttpSettings {
    pub fn parsed_base_url(&self) -> Result<Url, TransportError> {
        Url::parse(&self.base_url).map_err(|err| TransportError::InvalidUrl {
            url: self.base_url.clone(),
            message: err.to_string(),
        })
    }
}

/// No client-wide request timeout: every call sets its own.
pub fn build_client(settings: &HttpSettings) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .build()
        .map_err(|err| TransportError::Client(err.to_string()))
}

/// Appends `segments` to the base path, keeping any prefix such as `/api`.
pub(crate) fn join_path(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    let mut path = base.path().trim_end_matches('/').to_string();
    for segment in segments {
        path.push('/');
        path.push_str(segment.trim_matches('/'));
    }
    url.set_path(&path);
    url
}

#[async_trait]
pub trait AnalysisTransport: Send + Sync {
    /// Fetches the raw payload for one analysis type. Failures come back as
    /// an unclassified signal.
    async fn fetch_analysis(
        &self,
        analysis_type: AnalysisType,
        timeout: Duration,
    ) -> Result<Value, FailureSignal>;
}

#[derive(Debug, Clone)]
pub struct ReqwestAnalysisTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestAnalysisTransport {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn endpoint_url(&self, analysis_type: AnalysisType) -> Option<Url> {
        let endpoint = analysis_type.endpoint()?;
        Some(join_path(&self.base_url, &["ai-analytics", endpoint]))
    }
}

#[async_trait]
impl AnalysisTransport for ReqwestAnalysisTransport {
    async fn fetch_analysis(
        &self,
        analysis_type: AnalysisType,
        timeout: Duration,
    ) -> Result<Value, FailureSignal> {
        let url = self
            .endpoint_url(analysis_type)
            .ok_or_else(|| FailureSignal::transport(format!("{analysis_type} has no endpoint")))?;

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(signal_from_reqwest)?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned);
        let body = response.bytes().await.map_err(signal_from_reqwest)?;

        if !status.is_success() {
            let message = error_message(&body)
                .or_else(|| status.canonical_reason().map(ToOwned::to_owned))
                .unwrap_or_else(|| "request failed".to_string());
            return Err(FailureSignal::http(status.as_u16(), retry_after, message));
        }

        serde_json::from_slice(&body)
            .map_err(|err| FailureSignal::transport(format!("invalid analysis payload: {err}")))
    }
}

pub(crate) fn signal_from_reqwest(err: reqwest::Error) -> FailureSignal {
    if err.is_timeout() {
        return FailureSignal::timed_out(err.to_string());
    }
    match err.status() {
        Some(status) => FailureSignal::http(status.as_u16(), None, err.to_string()),
        None => FailureSignal::transport(err.to_string()),
    }
}

/// Pulls `message` or `error` out of a JSON error body.
fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["message", "error"]
        .iter()
        .filter_map(|field| value.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_keeps_base_prefix() {
        let base = Url::parse("http://host:5000/api/").unwrap();
        assert_eq!(
            join_path(&base, &["ai-analytics", "occupancy-analysis"]).as_str(),
            "http://host:5000/api/ai-analytics/occupancy-analysis"
        );
        let bare = Url::parse("http://host").unwrap();
        assert_eq!(join_path(&bare, &["health"]).as_str(), "http://host/health");
    }

    #[test]
    fn error_message_prefers_message_field() {
        assert_eq!(
            error_message(br#"{"message":"quota used","error":"x"}"#),
            Some("quota used".to_string())
        );
        assert_eq!(error_message(br#"{"error":"nope"}"#), Some("nope".to_string()));
        assert_eq!(error_message(b"<html>"), None);
    }
}
