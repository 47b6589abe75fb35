//! Orchestrator core: pure job/stream state machines, failure taxonomy and
//! report shaping. No IO lives here.
mod aggregate;
mod analysis;
mod effect;
mod failure;
mod msg;
mod progress;
mod report;
mod state;
mod status;
pub mod stream;
mod transform;
mod update;

pub use aggregate::{merge, MergedReport, SUMMARY_SEPARATOR};
pub use analysis::{AnalysisType, ParseAnalysisTypeError, DEFAULT_TIMEOUT_MS};
pub use effect::{JobEffect, JobNotification};
pub use failure::{
    classify, parse_retry_after, AnalysisError, FailureKind, FailureSignal,
    DEFAULT_RETRY_AFTER_SECS,
};
pub use msg::JobMsg;
pub use progress::{
    stage_plan, ProgressTimeline, ProgressUpdate, StageDefinition, TimelineStatus, STAGE_COUNT,
};
pub use report::{AnalysisReport, ReportDetails, ReportMetadata};
pub use state::{AnalysisJob, JobId, JobState};
pub use status::{classify_health_response, ServiceState, ServiceStatus};
pub use transform::{field_mapping, normalize, FieldMapping};
pub use update::update;
