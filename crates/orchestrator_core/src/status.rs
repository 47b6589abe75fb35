use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceState {
    Online,
    Degraded,
    Offline,
    NoHealthEndpoint,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub available: bool,
    pub status: ServiceState,
    pub message: String,
    pub checked_at: DateTime<Utc>,
}

impl ServiceStatus {
    pub fn new(
        status: ServiceState,
        message: impl Into<String>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            available: status == ServiceState::Online,
            status,
            message: message.into(),
            checked_at,
        }
    }
}

/// Classifies an HTTP answer from the health endpoint.
///
/// Only an object holding exactly `status == "OK"` and a string `message`
/// counts as online; any other successful body is degraded.
pub fn classify_health_response(http_status: u16, body: &[u8]) -> (ServiceState, String) {
    if http_status == 404 {
        return (
            ServiceState::NoHealthEndpoint,
            "health endpoint not found".to_string(),
        );
    }
    if !(200..300).contains(&http_status) {
        return (
            ServiceState::Error,
            format!("health check failed with HTTP {http_status}"),
        );
    }

    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let Some(Value::Object(fields)) = parsed else {
        return (
            ServiceState::Degraded,
            "health endpoint returned an unexpected body".to_string(),
        );
    };

    let status = fields.get("status").and_then(Value::as_str);
    let message = fields.get("message").and_then(Value::as_str);
    match (status, message) {
        (Some("OK"), Some(message)) if fields.len() == 2 => {
            (ServiceState::Online, message.to_string())
        }
        (Some(other), _) => (
            ServiceState::Degraded,
            format!("service reported status {other}"),
        ),
        (None, _) => (
            ServiceState::Degraded,
            "health response is missing a status".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_ok_shape_is_online() {
        let (state, message) = classify_health_response(200, br#"{"status":"OK","message":"up"}"#);
        assert_eq!(state, ServiceState::Online);
        assert_eq!(message, "up");
    }

    #[test]
    fn unexpected_shapes_are_degraded() {
        for body in [
            &br#"{"status":"OK","message":"up","extra":1}"#[..],
            br#"{"status":"OK"}"#,
            br#"{"status":"maintenance","message":"x"}"#,
            br#"[1,2]"#,
            b"pong",
        ] {
            let (state, _) = classify_health_response(200, body);
            assert_eq!(state, ServiceState::Degraded, "{}", String::from_utf8_lossy(body));
        }
    }

    #[test]
    fn http_failures_map_to_endpoint_or_error() {
        assert_eq!(classify_health_response(404, b"").0, ServiceState::NoHealthEndpoint);
        assert_eq!(classify_health_response(500, b"").0, ServiceState::Error);
        assert_eq!(classify_health_response(401, b"").0, ServiceState::Error);
    }
}
