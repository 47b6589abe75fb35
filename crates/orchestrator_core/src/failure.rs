use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Wait suggested to the caller when a 429 carries no usable `retry-after`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FailureKind {
    Cancelled,
    Timeout,
    RateLimited { retry_after_secs: u64 },
    QuotaExhausted,
    BillingIssue,
    Offline,
    Generic { http_status: Option<u16> },
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RateLimited { retry_after_secs } => {
                write!(f, "rate limited (retry after {retry_after_secs}s)")
            }
            FailureKind::QuotaExhausted => write!(f, "quota exhausted"),
            FailureKind::BillingIssue => write!(f, "billing issue"),
            FailureKind::Offline => write!(f, "service offline"),
            FailureKind::Generic {
                http_status: Some(code),
            } => write!(f, "http status {code}"),
            FailureKind::Generic { http_status: None } => write!(f, "request failed"),
        }
    }
}

/// Terminal failure of a job: classification plus the message to surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisError {
    pub kind: FailureKind,
    pub message: String,
}

impl AnalysisError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "analysis cancelled")
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Everything observed about a failed request, before classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureSignal {
    pub aborted_by_caller: bool,
    pub timed_out: bool,
    pub http_status: Option<u16>,
    pub retry_after: Option<String>,
    pub message: String,
}

impl FailureSignal {
    pub fn aborted() -> Self {
        Self {
            aborted_by_caller: true,
            message: "analysis cancelled".to_string(),
            ..Self::default()
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn http(status: u16, retry_after: Option<String>, message: impl Into<String>) -> Self {
        Self {
            http_status: Some(status),
            retry_after,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Maps a failure signal onto the taxonomy. First match wins:
/// cancelled, timeout, 429, 503, 402, then generic.
pub fn classify(signal: &FailureSignal, now: DateTime<Utc>) -> AnalysisError {
    if signal.aborted_by_caller {
        return AnalysisError::new(FailureKind::Cancelled, signal.message.clone());
    }
    if signal.timed_out {
        return AnalysisError::new(FailureKind::Timeout, signal.message.clone());
    }
    match signal.http_status {
        Some(429) => {
            let retry_after_secs = parse_retry_after(signal.retry_after.as_deref(), now);
            AnalysisError::new(
                FailureKind::RateLimited { retry_after_secs },
                format!("rate limited, retry after {retry_after_secs}s"),
            )
        }
        Some(503) => AnalysisError::new(FailureKind::QuotaExhausted, signal.message.clone()),
        Some(402) => AnalysisError::new(FailureKind::BillingIssue, signal.message.clone()),
        Some(code) => AnalysisError::new(
            FailureKind::Generic {
                http_status: Some(code),
            },
            format!("HTTP {code}: {}", signal.message),
        ),
        None => AnalysisError::new(
            FailureKind::Generic { http_status: None },
            signal.message.clone(),
        ),
    }
}

/// `retry-after` is either delta-seconds or an HTTP date.
pub fn parse_retry_after(value: Option<&str>, now: DateTime<Utc>) -> u64 {
    let Some(raw) = value.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return DEFAULT_RETRY_AFTER_SECS;
    };
    if let Ok(secs) = raw.parse::<u64>() {
        return secs;
    }
    match DateTime::parse_from_rfc2822(raw) {
        Ok(at) => {
            let delta = at.with_timezone(&Utc) - now;
            u64::try_from(delta.num_seconds()).unwrap_or(0)
        }
        Err(_) => DEFAULT_RETRY_AFTER_SECS,
    }
}
