use crate::{FailureKind, JobId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEffect {
    StartProgress,
    CompleteProgress,
    StopProgress,
    AbortRequest,
    Notify(JobNotification),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobNotification {
    Completed { job_id: JobId },
    Failed { job_id: JobId, kind: FailureKind },
    Cancelled { job_id: JobId },
}
