use std::time::Duration;

use crate::{
    AnalysisError, AnalysisJob, FailureKind, JobEffect, JobMsg, JobNotification, JobState,
    STAGE_COUNT,
};

/// Pure update function: applies a message to a job and returns any effects.
///
/// Messages that do not fit the current state are dropped without touching
/// the job. In particular nothing moves a job out of a terminal state, so a
/// response that lands after a cancel is discarded here.
pub fn update(mut job: AnalysisJob, msg: JobMsg) -> (AnalysisJob, Vec<JobEffect>) {
    let effects = match msg {
        JobMsg::Dispatch { at } => {
            if job.state != JobState::Idle {
                return (job, Vec::new());
            }
            job.state = JobState::Dispatched;
            job.started_at = Some(at);
            job.progress_percent = 0;
            job.stage_index = 0;
            job.elapsed_secs = 0;
            vec![JobEffect::StartProgress]
        }
        JobMsg::RequestSent => {
            if job.state == JobState::Dispatched {
                job.state = JobState::Running;
            }
            Vec::new()
        }
        JobMsg::StageReached { update, elapsed } => {
            if job.state.is_active() {
                job.progress_percent = job.progress_percent.max(update.progress_percent);
                job.stage_index = job.stage_index.max(update.stage_index);
                record_elapsed(&mut job, elapsed);
            }
            Vec::new()
        }
        JobMsg::ResponseReceived { report, elapsed } => {
            if !job.state.is_active() {
                return (job, Vec::new());
            }
            job.state = JobState::Completed;
            job.report = Some(report);
            job.progress_percent = 100;
            job.stage_index = STAGE_COUNT - 1;
            record_elapsed(&mut job, elapsed);
            vec![
                JobEffect::CompleteProgress,
                JobEffect::Notify(JobNotification::Completed { job_id: job.id() }),
            ]
        }
        JobMsg::RequestFailed { error, elapsed } => {
            if !job.state.is_active() {
                return (job, Vec::new());
            }
            if error.kind == FailureKind::Cancelled {
                return cancel(job);
            }
            let mut effects = Vec::with_capacity(3);
            if error.kind == FailureKind::Timeout {
                effects.push(JobEffect::AbortRequest);
            }
            effects.push(JobEffect::StopProgress);
            effects.push(JobEffect::Notify(JobNotification::Failed {
                job_id: job.id(),
                kind: error.kind.clone(),
            }));
            job.state = JobState::Failed;
            job.error = Some(error);
            record_elapsed(&mut job, elapsed);
            effects
        }
        JobMsg::CancelRequested => {
            if job.state.is_terminal() {
                return (job, Vec::new());
            }
            return cancel(job);
        }
    };

    (job, effects)
}

fn cancel(mut job: AnalysisJob) -> (AnalysisJob, Vec<JobEffect>) {
    job.state = JobState::Cancelled;
    job.error = Some(AnalysisError::cancelled());
    let effects = vec![
        JobEffect::AbortRequest,
        JobEffect::StopProgress,
        JobEffect::Notify(JobNotification::Cancelled { job_id: job.id() }),
    ];
    (job, effects)
}

fn record_elapsed(job: &mut AnalysisJob, elapsed: Duration) {
    job.elapsed_secs = job.elapsed_secs.max(elapsed.as_secs());
}
