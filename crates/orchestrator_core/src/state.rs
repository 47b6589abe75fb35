use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{AnalysisError, AnalysisReport, AnalysisType};

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Idle,
    Dispatched,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, JobState::Dispatched | JobState::Running)
    }
}

/// Snapshot of one analysis request. Only `update` mutates it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    id: JobId,
    analysis_type: AnalysisType,
    pub(crate) state: JobState,
    pub(crate) started_at: Option<DateTime<Utc>>,
    estimated_duration_secs: u64,
    pub(crate) elapsed_secs: u64,
    pub(crate) progress_percent: u8,
    pub(crate) stage_index: usize,
    timeout: Duration,
    pub(crate) report: Option<AnalysisReport>,
    pub(crate) error: Option<AnalysisError>,
}

impl AnalysisJob {
    pub fn new(id: JobId, analysis_type: AnalysisType, timeout: Duration) -> Self {
        Self {
            id,
            analysis_type,
            state: JobState::Idle,
            started_at: None,
            estimated_duration_secs: analysis_type.estimated_duration().as_secs(),
            elapsed_secs: 0,
            progress_percent: 0,
            stage_index: 0,
            timeout,
            report: None,
            error: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn analysis_type(&self) -> AnalysisType {
        self.analysis_type
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn estimated_duration_secs(&self) -> u64 {
        self.estimated_duration_secs
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn stage_index(&self) -> usize {
        self.stage_index
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        self.report.as_ref()
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        self.error.as_ref()
    }

    /// The terminal outcome, once there is one.
    pub fn outcome(&self) -> Option<Result<AnalysisReport, AnalysisError>> {
        match self.state {
            JobState::Completed => self.report.clone().map(Ok),
            JobState::Failed | JobState::Cancelled => self.error.clone().map(Err),
            JobState::Idle | JobState::Dispatched | JobState::Running => None,
        }
    }
}
