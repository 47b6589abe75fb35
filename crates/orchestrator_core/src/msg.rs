use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{AnalysisError, AnalysisReport, ProgressUpdate};

#[derive(Debug, Clone, PartialEq)]
pub enum JobMsg {
    /// Job handed to the dispatcher.
    Dispatch { at: DateTime<Utc> },
    /// The network request left the client.
    RequestSent,
    /// Simulated progress reached a new stage.
    StageReached {
        update: ProgressUpdate,
        elapsed: Duration,
    },
    /// Backend answered and the payload was normalized.
    ResponseReceived {
        report: AnalysisReport,
        elapsed: Duration,
    },
    /// Request failed with a classified error.
    RequestFailed {
        error: AnalysisError,
        elapsed: Duration,
    },
    /// Caller asked to cancel.
    CancelRequested,
}
