//! Orchestrator engine: async IO around the pure core. Health probing,
//! request dispatch, progress timers, streaming and report export.
mod cache;
mod client;
mod config;
mod dispatch;
mod engine;
mod notify;
mod persist;
mod probe;
mod progress;
mod stream;
mod types;

pub use cache::{CacheEntry, TtlCache};
pub use client::{build_client, AnalysisTransport, HttpSettings, ReqwestAnalysisTransport};
pub use config::{ConfigError, OrchestratorConfig, DEFAULT_CONFIG_FILENAME};
pub use dispatch::{ComprehensiveRun, DispatchSettings, Dispatcher, JobHandle};
pub use engine::{Orchestrator, OrchestratorSettings};
pub use notify::{ChannelNotificationSink, LogNotificationSink, NotificationSink};
pub use persist::{
    ensure_output_dir, export_merged_report, export_report, report_filename, AtomicFileWriter,
    PersistError,
};
pub use probe::{
    AvailabilityProbe, HealthReply, HealthTransport, ProbeSettings, ReqwestHealthTransport,
};
pub use progress::{ProgressCallback, ProgressEstimator};
pub use stream::{
    FrameStream, StreamConnector, StreamConsumer, StreamEndpoint, StreamKind, WsConnector,
};
pub use types::{DispatchError, ParseStreamKindError, TransportError};
