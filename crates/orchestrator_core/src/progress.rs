use std::time::Duration;

use serde::Serialize;

use crate::AnalysisType;

pub const STAGE_COUNT: usize = 6;

/// Label, target percentage and share (per mille) of the estimated duration.
const STAGE_TABLE: [(&str, u8, u32); STAGE_COUNT] = [
    ("Preparing analysis request", 5, 20),
    ("Connecting to AI service", 15, 80),
    ("Collecting portal data", 35, 250),
    ("Running AI analysis", 65, 350),
    ("Generating insights", 85, 200),
    ("Finalizing report", 95, 100),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDefinition {
    pub index: usize,
    pub label: &'static str,
    pub target_progress_percent: u8,
    pub planned_duration: Duration,
}

/// The fixed six-stage schedule for a type, scaled to its estimated duration.
pub fn stage_plan(analysis_type: AnalysisType) -> Vec<StageDefinition> {
    let total = analysis_type.estimated_duration();
    STAGE_TABLE
        .iter()
        .enumerate()
        .map(|(index, (label, target, share))| StageDefinition {
            index,
            label: *label,
            target_progress_percent: *target,
            planned_duration: total * *share / 1000,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub stage_index: usize,
    pub progress_percent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
}

/// Pure bookkeeping for a simulated progress run. Time is fed in by the
/// caller, which owns the actual timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressTimeline {
    stages: Vec<StageDefinition>,
    status: TimelineStatus,
    stage_index: usize,
    progress_percent: u8,
    consumed_in_stage: Duration,
}

impl ProgressTimeline {
    pub fn new(stages: Vec<StageDefinition>) -> Self {
        Self {
            stages,
            status: TimelineStatus::Idle,
            stage_index: 0,
            progress_percent: 0,
            consumed_in_stage: Duration::ZERO,
        }
    }

    pub fn for_type(analysis_type: AnalysisType) -> Self {
        Self::new(stage_plan(analysis_type))
    }

    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    pub fn status(&self) -> TimelineStatus {
        self.status
    }

    pub fn stage_index(&self) -> usize {
        self.stage_index
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            TimelineStatus::Completed | TimelineStatus::Cancelled
        )
    }

    /// Resets to zero and reaches stage 0 immediately.
    pub fn start(&mut self) -> ProgressUpdate {
        self.status = TimelineStatus::Running;
        self.stage_index = 0;
        self.progress_percent = 0;
        self.consumed_in_stage = Duration::ZERO;
        if let Some(first) = self.stages.first() {
            self.progress_percent = first.target_progress_percent;
        }
        self.snapshot()
    }

    /// Time until the next stage fires, if one is due at all.
    pub fn next_delay(&self) -> Option<Duration> {
        if self.status != TimelineStatus::Running || self.stage_index + 1 >= self.stages.len() {
            return None;
        }
        let planned = self.stages[self.stage_index].planned_duration;
        Some(planned.saturating_sub(self.consumed_in_stage))
    }

    pub fn advance(&mut self) -> Option<ProgressUpdate> {
        if self.status != TimelineStatus::Running {
            return None;
        }
        let next = self.stages.get(self.stage_index + 1)?;
        self.stage_index = next.index;
        self.progress_percent = self.progress_percent.max(next.target_progress_percent);
        self.consumed_in_stage = Duration::ZERO;
        Some(self.snapshot())
    }

    /// `elapsed` is the time spent in the current stage since it was last armed.
    pub fn pause(&mut self, elapsed: Duration) -> bool {
        if self.status != TimelineStatus::Running {
            return false;
        }
        let planned = self
            .stages
            .get(self.stage_index)
            .map_or(Duration::ZERO, |stage| stage.planned_duration);
        self.consumed_in_stage = (self.consumed_in_stage + elapsed).min(planned);
        self.status = TimelineStatus::Paused;
        true
    }

    /// Returns the remaining delay of the current stage, if a next stage exists.
    pub fn resume(&mut self) -> Option<Duration> {
        if self.status != TimelineStatus::Paused {
            return None;
        }
        self.status = TimelineStatus::Running;
        self.next_delay()
    }

    pub fn complete(&mut self) -> ProgressUpdate {
        if self.status != TimelineStatus::Cancelled {
            self.status = TimelineStatus::Completed;
            self.stage_index = self.stages.len().saturating_sub(1);
            self.progress_percent = 100;
        }
        self.snapshot()
    }

    pub fn cancel(&mut self) {
        if self.status != TimelineStatus::Completed {
            self.status = TimelineStatus::Cancelled;
        }
    }

    fn snapshot(&self) -> ProgressUpdate {
        ProgressUpdate {
            stage_index: self.stage_index,
            progress_percent: self.progress_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_has_six_ordered_stages() {
        let plan = stage_plan(AnalysisType::Occupancy);
        assert_eq!(plan.len(), STAGE_COUNT);
        assert!(plan
            .windows(2)
            .all(|w| w[0].target_progress_percent < w[1].target_progress_percent));
        let total: Duration = plan.iter().map(|s| s.planned_duration).sum();
        assert_eq!(total, AnalysisType::Occupancy.estimated_duration());
    }

    #[test]
    fn comprehensive_stages_run_longer() {
        let short = stage_plan(AnalysisType::Occupancy);
        let long = stage_plan(AnalysisType::Comprehensive);
        for (a, b) in short.iter().zip(&long) {
            assert!(b.planned_duration > a.planned_duration);
        }
    }

    #[test]
    fn run_to_completion_is_monotonic() {
        let mut timeline = ProgressTimeline::for_type(AnalysisType::Revenue);
        let mut seen = vec![0, timeline.start().progress_percent];
        while timeline.next_delay().is_some() {
            seen.push(timeline.advance().unwrap().progress_percent);
        }
        seen.push(timeline.complete().progress_percent);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last(), Some(&100));
        assert_eq!(timeline.stage_index(), STAGE_COUNT - 1);
    }

    #[test]
    fn pause_keeps_elapsed_time_in_stage() {
        let mut timeline = ProgressTimeline::for_type(AnalysisType::Occupancy);
        timeline.start();
        let planned = timeline.stages()[0].planned_duration;
        assert!(timeline.pause(Duration::from_secs(1)));
        assert_eq!(timeline.next_delay(), None);
        assert_eq!(timeline.resume(), Some(planned - Duration::from_secs(1)));
        assert_eq!(timeline.resume(), None);
    }

    #[test]
    fn cancelled_timeline_does_not_advance_or_complete() {
        let mut timeline = ProgressTimeline::for_type(AnalysisType::Trends);
        timeline.start();
        timeline.cancel();
        assert_eq!(timeline.advance(), None);
        assert_eq!(timeline.next_delay(), None);
        assert_eq!(timeline.complete().progress_percent, 5);
        assert_eq!(timeline.status(), TimelineStatus::Cancelled);
    }
}
