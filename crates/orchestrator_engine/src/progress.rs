use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use engine_logging::engine_trace;
use orchestrator_core::{AnalysisType, JobId, ProgressTimeline, ProgressUpdate, TimelineStatus};
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Receives each stage update together with the time since `start`.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate, Duration) + Send + Sync>;

struct TimerSlot {
    timeline: ProgressTimeline,
    started: Instant,
    armed_at: Instant,
    generation: u64,
    pending: Option<AbortHandle>,
    on_progress: ProgressCallback,
}

impl TimerSlot {
    fn disarm(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.generation += 1;
    }
}

/// Registry of simulated progress timers, at most one pending per job.
///
/// Stage timers are tokio tasks; a timer that fires after its slot was
/// re-armed or removed sees a stale generation and does nothing.
#[derive(Clone, Default)]
pub struct ProgressEstimator {
    slots: Arc<Mutex<HashMap<JobId, TimerSlot>>>,
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the timeline for `job_id`. Stage 0 is reported
    /// before this returns.
    pub fn start(&self, job_id: JobId, analysis_type: AnalysisType, on_progress: ProgressCallback) {
        let now = Instant::now();
        let mut timeline = ProgressTimeline::for_type(analysis_type);
        let first = timeline.start();
        {
            let mut slots = self.lock();
            // Generations continue across restarts so a stale timer never matches.
            let generation = slots.remove(&job_id).map_or(0, |mut previous| {
                previous.disarm();
                previous.generation
            });
            let mut slot = TimerSlot {
                timeline,
                started: now,
                armed_at: now,
                generation,
                pending: None,
                on_progress: on_progress.clone(),
            };
            self.arm(job_id, &mut slot);
            slots.insert(job_id, slot);
        }
        on_progress(first, Duration::ZERO);
    }

    /// Stops the pending timer and keeps the time already spent in the stage.
    pub fn pause(&self, job_id: JobId) -> bool {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(&job_id) else {
            return false;
        };
        let elapsed = Instant::now().saturating_duration_since(slot.armed_at);
        if !slot.timeline.pause(elapsed) {
            return false;
        }
        slot.disarm();
        engine_trace!("progress paused for job {}", job_id);
        true
    }

    /// Re-arms the current stage with whatever time it had left.
    pub fn resume(&self, job_id: JobId) -> bool {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(&job_id) else {
            return false;
        };
        if slot.timeline.status() != TimelineStatus::Paused {
            return false;
        }
        slot.timeline.resume();
        self.arm(job_id, slot);
        engine_trace!("progress resumed for job {}", job_id);
        true
    }

    /// Jumps to 100% on the last stage and drops the job's timers.
    pub fn complete(&self, job_id: JobId) -> Option<ProgressUpdate> {
        let mut slot = self.lock().remove(&job_id)?;
        slot.disarm();
        let last = slot.timeline.complete();
        (slot.on_progress)(last, slot.started.elapsed());
        Some(last)
    }

    /// Drops the job's timers without a final update.
    pub fn cancel(&self, job_id: JobId) -> bool {
        match self.lock().remove(&job_id) {
            Some(mut slot) => {
                slot.disarm();
                slot.timeline.cancel();
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self, job_id: JobId) -> Option<ProgressUpdate> {
        self.lock().get(&job_id).map(|slot| ProgressUpdate {
            stage_index: slot.timeline.stage_index(),
            progress_percent: slot.timeline.progress_percent(),
        })
    }

    pub fn status(&self, job_id: JobId) -> Option<TimelineStatus> {
        self.lock().get(&job_id).map(|slot| slot.timeline.status())
    }

    /// Number of armed stage timers for the job: 0 or 1.
    pub fn pending_timers(&self, job_id: JobId) -> usize {
        self.lock()
            .get(&job_id)
            .map_or(0, |slot| usize::from(slot.pending.is_some()))
    }

    pub fn tracked_jobs(&self) -> usize {
        self.lock().len()
    }

    fn arm(&self, job_id: JobId, slot: &mut TimerSlot) {
        slot.disarm();
        let Some(delay) = slot.timeline.next_delay() else {
            return;
        };
        slot.armed_at = Instant::now();
        let deadline = slot.armed_at + delay;
        let generation = slot.generation;
        let estimator = self.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            estimator.fire(job_id, generation);
        });
        slot.pending = Some(task.abort_handle());
    }

    fn fire(&self, job_id: JobId, generation: u64) {
        let (update, callback, elapsed) = {
            let mut slots = self.lock();
            let Some(slot) = slots.get_mut(&job_id) else {
                return;
            };
            if slot.generation != generation {
                return;
            }
            slot.pending = None;
            let Some(update) = slot.timeline.advance() else {
                return;
            };
            self.arm(job_id, slot);
            (update, slot.on_progress.clone(), slot.started.elapsed())
        };
        engine_trace!(
            "job {} reached stage {} ({}%)",
            job_id,
            update.stage_index,
            update.progress_percent
        );
        callback(update, elapsed);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, TimerSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
