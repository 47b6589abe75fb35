use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use engine_logging::{engine_debug, engine_info, engine_warn};
use orchestrator_core::{classify_health_response, ServiceState, ServiceStatus};
use url::Url;

use crate::cache::TtlCache;
use crate::client::join_path;

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub health_path: String,
    pub ttl: Duration,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub wait_limit: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            health_path: "health".to_string(),
            ttl: Duration::from_secs(30),
            request_timeout: Duration::from_secs(8),
            poll_interval: Duration::from_millis(100),
            wait_limit: Duration::from_secs(5),
        }
    }
}

/// Raw outcome of one health request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthReply {
    Http { status: u16, body: Vec<u8> },
    Unreachable { message: String },
}

#[async_trait]
pub trait HealthTransport: Send + Sync {
    async fn probe(&self, timeout: Duration) -> HealthReply;
}

#[derive(Debug, Clone)]
pub struct ReqwestHealthTransport {
    client: reqwest::Client,
    url: Url,
}

impl ReqwestHealthTransport {
    pub fn new(client: reqwest::Client, base_url: &Url, health_path: &str) -> Self {
        Self {
            client,
            url: join_path(base_url, &[health_path]),
        }
    }
}

#[async_trait]
impl HealthTransport for ReqwestHealthTransport {
    async fn probe(&self, timeout: Duration) -> HealthReply {
        let response = match self.client.get(self.url.clone()).timeout(timeout).send().await {
            Ok(response) => response,
            Err(err) => {
                return HealthReply::Unreachable {
                    message: err.to_string(),
                }
            }
        };
        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(body) => HealthReply::Http {
                status,
                body: body.to_vec(),
            },
            Err(err) => HealthReply::Unreachable {
                message: err.to_string(),
            },
        }
    }
}

/// Health check with a cached result and a single request in flight at a time.
pub struct AvailabilityProbe {
    transport: Arc<dyn HealthTransport>,
    cache: TtlCache<(), ServiceStatus>,
    in_flight: AtomicBool,
    network_calls: AtomicUsize,
    settings: ProbeSettings,
}

impl AvailabilityProbe {
    pub fn new(transport: Arc<dyn HealthTransport>, settings: ProbeSettings) -> Self {
        Self {
            transport,
            cache: TtlCache::new(settings.ttl),
            in_flight: AtomicBool::new(false),
            network_calls: AtomicUsize::new(0),
            settings,
        }
    }

    pub async fn check_availability(&self) -> ServiceStatus {
        if let Some(status) = self.cache.get(&()) {
            engine_debug!("health status served from cache: {:?}", status.status);
            return status;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return self.await_in_flight().await;
        }
        let _guard = InFlightGuard(&self.in_flight);

        // Another caller may have finished between the cache read and the guard.
        if let Some(status) = self.cache.get(&()) {
            return status;
        }

        let status = self.run_probe().await;
        self.cache.insert((), status.clone());
        status
    }

    /// Forces the next check to hit the network.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_status(&self) -> Option<ServiceStatus> {
        self.cache.get(&())
    }

    /// Health requests issued so far.
    pub fn network_calls(&self) -> usize {
        self.network_calls.load(Ordering::Relaxed)
    }

    async fn run_probe(&self) -> ServiceStatus {
        self.network_calls.fetch_add(1, Ordering::Relaxed);
        let reply = self.transport.probe(self.settings.request_timeout).await;
        let (state, message) = match reply {
            HealthReply::Http { status, body } => classify_health_response(status, &body),
            HealthReply::Unreachable { message } => (ServiceState::Offline, message),
        };
        match state {
            ServiceState::Online => engine_info!("AI service online: {}", message),
            other => engine_warn!("AI service health {:?}: {}", other, message),
        }
        ServiceStatus::new(state, message, Utc::now())
    }

    async fn await_in_flight(&self) -> ServiceStatus {
        let deadline = tokio::time::Instant::now() + self.settings.wait_limit;
        while self.in_flight.load(Ordering::Acquire) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(self.settings.poll_interval).await;
        }
        self.cache.get(&()).unwrap_or_else(|| {
            ServiceStatus::new(
                ServiceState::Error,
                "health check still in progress",
                Utc::now(),
            )
        })
    }
}

/// Clears the in-flight flag even if the probing future is dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
