use std::sync::Arc;

use orchestrator_core::ServiceStatus;
use url::Url;

use crate::client::{build_client, HttpSettings, ReqwestAnalysisTransport};
use crate::dispatch::{DispatchSettings, Dispatcher};
use crate::notify::{LogNotificationSink, NotificationSink};
use crate::probe::{AvailabilityProbe, ProbeSettings, ReqwestHealthTransport};
use crate::stream::{StreamConnector, StreamConsumer, StreamEndpoint, WsConnector};
use crate::TransportError;

#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub http: HttpSettings,
    pub probe: ProbeSettings,
    pub dispatch: DispatchSettings,
}

/// Wires the probe, dispatcher and stream consumer onto one HTTP client.
pub struct Orchestrator {
    base_url: Url,
    probe: Arc<AvailabilityProbe>,
    dispatcher: Dispatcher,
    stream: StreamConsumer,
}

impl Orchestrator {
    pub fn new(settings: OrchestratorSettings) -> Result<Self, TransportError> {
        Self::with_parts(settings, Arc::new(LogNotificationSink), Arc::new(WsConnector))
    }

    pub fn with_parts(
        settings: OrchestratorSettings,
        sink: Arc<dyn NotificationSink>,
        connector: Arc<dyn StreamConnector>,
    ) -> Result<Self, TransportError> {
        let base_url = settings.http.parsed_base_url()?;
        let client = build_client(&settings.http)?;

        let health =
            ReqwestHealthTransport::new(client.clone(), &base_url, &settings.probe.health_path);
        let probe = Arc::new(AvailabilityProbe::new(Arc::new(health), settings.probe));
        let transport = ReqwestAnalysisTransport::new(client, base_url.clone());
        let dispatcher = Dispatcher::new(
            Arc::new(transport),
            Some(probe.clone()),
            sink,
            settings.dispatch,
        );

        Ok(Self {
            base_url,
            probe,
            dispatcher,
            stream: StreamConsumer::new(connector),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn probe(&self) -> &AvailabilityProbe {
        &self.probe
    }

    pub fn stream(&self) -> &StreamConsumer {
        &self.stream
    }

    pub async fn check_availability(&self) -> ServiceStatus {
        self.probe.check_availability().await
    }

    pub fn stream_url(&self, endpoint: &StreamEndpoint) -> Result<Url, TransportError> {
        endpoint.url(&self.base_url)
    }

    pub fn connect_stream(&self, endpoint: &StreamEndpoint) -> Result<Url, TransportError> {
        let url = self.stream_url(endpoint)?;
        self.stream.connect(url.clone());
        Ok(url)
    }
}
