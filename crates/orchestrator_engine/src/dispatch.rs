use std::collections::HashMap;
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use engine_logging::{engine_debug, engine_info, engine_warn};
use futures_util::future::join_all;
use orchestrator_core::{
    classify, merge, normalize, update, AnalysisError, AnalysisJob, AnalysisReport, AnalysisType,
    FailureKind, FailureSignal, JobEffect, JobId, JobMsg, JobState, MergedReport, ServiceState,
};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::TtlCache;
use crate::client::AnalysisTransport;
use crate::notify::NotificationSink;
use crate::probe::AvailabilityProbe;
use crate::progress::{ProgressCallback, ProgressEstimator};
use crate::DispatchError;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Per-type timeouts replacing the built-in table.
    pub timeout_overrides: HashMap<AnalysisType, Duration>,
    /// `None` disables the report cache.
    pub report_cache_ttl: Option<Duration>,
    /// Consult the availability probe before each request.
    pub check_availability: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            timeout_overrides: HashMap::new(),
            report_cache_ttl: Some(Duration::from_secs(600)),
            check_availability: true,
        }
    }
}

impl DispatchSettings {
    pub fn timeout_for(&self, analysis_type: AnalysisType) -> Duration {
        self.timeout_overrides
            .get(&analysis_type)
            .copied()
            .unwrap_or_else(|| analysis_type.default_timeout())
    }
}

type JobCell = Arc<watch::Sender<AnalysisJob>>;

struct JobControl {
    cancel: CancellationToken,
    cell: JobCell,
}

struct Inner {
    transport: Arc<dyn AnalysisTransport>,
    probe: Option<Arc<AvailabilityProbe>>,
    progress: ProgressEstimator,
    sink: Arc<dyn NotificationSink>,
    report_cache: Option<TtlCache<AnalysisType, AnalysisReport>>,
    settings: DispatchSettings,
    next_id: AtomicU64,
    active: Mutex<HashMap<JobId, JobControl>>,
}

/// Owns every in-flight analysis job: its network call, timeout,
/// cancellation token and progress timers.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn AnalysisTransport>,
        probe: Option<Arc<AvailabilityProbe>>,
        sink: Arc<dyn NotificationSink>,
        settings: DispatchSettings,
    ) -> Self {
        let report_cache = settings.report_cache_ttl.map(TtlCache::new);
        Self {
            inner: Arc::new(Inner {
                transport,
                probe,
                progress: ProgressEstimator::new(),
                sink,
                report_cache,
                settings,
                next_id: AtomicU64::new(1),
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Dispatches one analysis. Expected failures surface through
    /// [`JobHandle::result`]; only a composite type is rejected here.
    pub fn start(
        &self,
        analysis_type: AnalysisType,
        timeout: Option<Duration>,
    ) -> Result<JobHandle, DispatchError> {
        ensure_dispatchable(analysis_type)?;
        Ok(self.spawn_job(analysis_type, timeout, CancellationToken::new()))
    }

    pub fn start_named(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<JobHandle, DispatchError> {
        let analysis_type = name.parse::<AnalysisType>()?;
        self.start(analysis_type, timeout)
    }

    /// Cancels a running job. Returns false when the job is unknown or
    /// already finished; repeated calls are harmless.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let control = self
            .lock_active()
            .get(&job_id)
            .map(|control| (control.cell.clone(), control.cancel.clone()));
        let Some((cell, token)) = control else {
            return false;
        };
        self.apply(job_id, &cell, &token, JobMsg::CancelRequested);
        true
    }

    /// Pauses the simulated progress only; the backend call keeps running.
    pub fn pause_progress(&self, job_id: JobId) -> bool {
        self.inner.progress.pause(job_id)
    }

    pub fn resume_progress(&self, job_id: JobId) -> bool {
        self.inner.progress.resume(job_id)
    }

    pub fn clear_report_cache(&self) {
        if let Some(cache) = &self.inner.report_cache {
            cache.clear();
        }
    }

    pub fn active_jobs(&self) -> usize {
        self.lock_active().len()
    }

    pub fn job(&self, job_id: JobId) -> Option<AnalysisJob> {
        self.lock_active()
            .get(&job_id)
            .map(|control| control.cell.borrow().clone())
    }

    pub fn progress(&self) -> &ProgressEstimator {
        &self.inner.progress
    }

    /// Starts the component analyses concurrently under one comprehensive
    /// job. An empty list means every component type. Every type is checked
    /// before anything is dispatched.
    pub fn start_comprehensive(
        &self,
        types: &[AnalysisType],
        timeout: Option<Duration>,
    ) -> Result<ComprehensiveRun, DispatchError> {
        let source = if types.is_empty() {
            &AnalysisType::COMPONENTS[..]
        } else {
            types
        };
        let mut requested: Vec<AnalysisType> = Vec::new();
        for analysis_type in source {
            ensure_dispatchable(*analysis_type)?;
            if !requested.contains(analysis_type) {
                requested.push(*analysis_type);
            }
        }

        let started = Instant::now();
        let (job, cell) =
            self.register(AnalysisType::Comprehensive, timeout, CancellationToken::new());
        let components = requested
            .iter()
            .map(|analysis_type| self.spawn_job(*analysis_type, timeout, job.cancel.child_token()))
            .collect();
        self.apply(job.id, &cell, &job.cancel, JobMsg::RequestSent);
        engine_info!(
            "comprehensive job {} fans out over {} types",
            job.id,
            requested.len()
        );

        Ok(ComprehensiveRun {
            job,
            cell,
            components,
            started,
        })
    }

    /// Runs the component analyses and merges whatever succeeded.
    pub async fn run_comprehensive(
        &self,
        types: &[AnalysisType],
        timeout: Option<Duration>,
    ) -> Result<MergedReport, DispatchError> {
        Ok(self.start_comprehensive(types, timeout)?.result().await)
    }

    fn spawn_job(
        &self,
        analysis_type: AnalysisType,
        timeout: Option<Duration>,
        token: CancellationToken,
    ) -> JobHandle {
        let (handle, cell) = self.register(analysis_type, timeout, token);
        let timeout = handle.state.borrow().timeout();
        tokio::spawn(self.clone().run_job(
            handle.id,
            analysis_type,
            timeout,
            cell,
            handle.cancel.clone(),
        ));
        handle
    }

    /// Allocates the job, makes it cancellable and moves it to dispatched.
    fn register(
        &self,
        analysis_type: AnalysisType,
        timeout: Option<Duration>,
        token: CancellationToken,
    ) -> (JobHandle, JobCell) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let timeout = timeout.unwrap_or_else(|| self.inner.settings.timeout_for(analysis_type));
        let (sender, receiver) = watch::channel(AnalysisJob::new(id, analysis_type, timeout));
        let cell: JobCell = Arc::new(sender);
        self.lock_active().insert(
            id,
            JobControl {
                cancel: token.clone(),
                cell: cell.clone(),
            },
        );

        engine_info!(
            "dispatching {} analysis as job {} (timeout {} ms)",
            analysis_type,
            id,
            timeout.as_millis()
        );
        self.apply(id, &cell, &token, JobMsg::Dispatch { at: Utc::now() });

        let handle = JobHandle {
            id,
            analysis_type,
            dispatcher: self.clone(),
            cancel: token,
            state: receiver,
        };
        (handle, cell)
    }

    /// The timeout runs from here and covers the availability check too.
    async fn run_job(
        self,
        id: JobId,
        analysis_type: AnalysisType,
        timeout: Duration,
        cell: JobCell,
        token: CancellationToken,
    ) {
        let started = Instant::now();

        if let Some(report) = self.cached_report(analysis_type) {
            engine_debug!("job {} served from report cache", id);
            let msg = JobMsg::ResponseReceived {
                report,
                elapsed: Duration::ZERO,
            };
            self.apply(id, &cell, &token, msg);
            return;
        }

        let attempt = self.attempt(id, analysis_type, started + timeout, &cell, &token);
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(classify(&FailureSignal::aborted(), Utc::now())),
            response = tokio::time::timeout(timeout, attempt) => {
                response.unwrap_or_else(|_| {
                    let signal = FailureSignal::timed_out(format!(
                        "no response within {} ms",
                        timeout.as_millis()
                    ));
                    Err(classify(&signal, Utc::now()))
                })
            }
        };

        let elapsed = started.elapsed();
        let msg = match outcome {
            Ok(payload) => JobMsg::ResponseReceived {
                report: normalize(analysis_type, payload, elapsed, Utc::now()),
                elapsed,
            },
            Err(error) => {
                if error.kind != FailureKind::Cancelled {
                    engine_warn!("job {} ({}) failed: {}", id, analysis_type, error);
                }
                JobMsg::RequestFailed { error, elapsed }
            }
        };
        self.apply(id, &cell, &token, msg);

        let completed = {
            let job = cell.borrow();
            (job.state() == JobState::Completed)
                .then(|| job.report().cloned())
                .flatten()
        };
        if let (Some(report), Some(cache)) = (completed, &self.inner.report_cache) {
            cache.insert(analysis_type, report);
        }
    }

    /// Availability gate, then the request itself.
    async fn attempt(
        &self,
        id: JobId,
        analysis_type: AnalysisType,
        deadline: Instant,
        cell: &JobCell,
        token: &CancellationToken,
    ) -> Result<Value, AnalysisError> {
        if let Some(error) = self.availability_gate().await {
            return Err(error);
        }
        self.apply(id, cell, token, JobMsg::RequestSent);
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.inner
            .transport
            .fetch_analysis(analysis_type, remaining)
            .await
            .map_err(|signal| classify(&signal, Utc::now()))
    }

    fn cached_report(&self, analysis_type: AnalysisType) -> Option<AnalysisReport> {
        self.inner.report_cache.as_ref()?.get(&analysis_type)
    }

    async fn availability_gate(&self) -> Option<AnalysisError> {
        if !self.inner.settings.check_availability {
            return None;
        }
        let probe = self.inner.probe.as_ref()?;
        let status = probe.check_availability().await;
        (status.status == ServiceState::Offline)
            .then(|| AnalysisError::new(FailureKind::Offline, status.message))
    }

    /// Runs `msg` through the pure update, publishes the new snapshot and then
    /// executes the effects outside the watch lock.
    fn apply(&self, id: JobId, cell: &JobCell, token: &CancellationToken, msg: JobMsg) {
        let mut effects = Vec::new();
        cell.send_if_modified(|job| {
            let (next, produced) = update(job.clone(), msg);
            effects = produced;
            let changed = next != *job;
            *job = next;
            changed
        });

        for effect in effects {
            self.run_effect(id, cell, token, effect);
        }

        let (analysis_type, state) = {
            let job = cell.borrow();
            (job.analysis_type(), job.state())
        };
        if state.is_terminal() && self.lock_active().remove(&id).is_some() {
            engine_info!("job {} ({}) finished as {:?}", id, analysis_type, state);
        }
    }

    fn run_effect(&self, id: JobId, cell: &JobCell, token: &CancellationToken, effect: JobEffect) {
        match effect {
            JobEffect::StartProgress => {
                let analysis_type = cell.borrow().analysis_type();
                let dispatcher = self.clone();
                let cell = cell.clone();
                let token = token.clone();
                let on_progress: ProgressCallback = Arc::new(move |update, elapsed| {
                    dispatcher.apply(id, &cell, &token, JobMsg::StageReached { update, elapsed });
                });
                self.inner.progress.start(id, analysis_type, on_progress);
            }
            JobEffect::CompleteProgress => {
                self.inner.progress.complete(id);
            }
            JobEffect::StopProgress => {
                self.inner.progress.cancel(id);
            }
            JobEffect::AbortRequest => token.cancel(),
            JobEffect::Notify(notification) => self.inner.sink.notify(&notification),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, HashMap<JobId, JobControl>> {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn ensure_dispatchable(analysis_type: AnalysisType) -> Result<(), DispatchError> {
    match analysis_type.endpoint() {
        Some(_) => Ok(()),
        None => Err(DispatchError::Composite(analysis_type)),
    }
}

/// Caller side of one dispatched job.
pub struct JobHandle {
    id: JobId,
    analysis_type: AnalysisType,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
    state: watch::Receiver<AnalysisJob>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn analysis_type(&self) -> AnalysisType {
        self.analysis_type
    }

    pub fn snapshot(&self) -> AnalysisJob {
        self.state.borrow().clone()
    }

    /// A fresh receiver that observes every later transition.
    pub fn subscribe(&self) -> watch::Receiver<AnalysisJob> {
        self.state.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) -> bool {
        self.dispatcher.cancel(self.id)
    }

    /// Resolves once the job is terminal.
    pub async fn result(mut self) -> Result<AnalysisReport, AnalysisError> {
        let outcome = match self.state.wait_for(|job| job.state().is_terminal()).await {
            Ok(job) => job.outcome(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(AnalysisError::new(
                FailureKind::Generic { http_status: None },
                "job dropped before finishing",
            ))
        })
    }
}

/// Caller side of a comprehensive run: one job of type `Comprehensive` that
/// follows the comprehensive stage plan, plus its component jobs.
///
/// Component jobs hold child tokens of the run's token, so cancelling the
/// run cancels all of them. Dropping an unfinished run cancels it.
pub struct ComprehensiveRun {
    job: JobHandle,
    cell: JobCell,
    components: Vec<JobHandle>,
    started: Instant,
}

impl ComprehensiveRun {
    pub fn id(&self) -> JobId {
        self.job.id()
    }

    pub fn component_ids(&self) -> Vec<JobId> {
        self.components.iter().map(JobHandle::id).collect()
    }

    pub fn snapshot(&self) -> AnalysisJob {
        self.job.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisJob> {
        self.job.subscribe()
    }

    pub fn cancel(&self) -> bool {
        self.job.cancel()
    }

    /// Waits for every component and merges the reports that came back.
    /// Components still running at the run's timeout are cancelled and
    /// listed as failed.
    pub async fn result(mut self) -> MergedReport {
        let components = std::mem::take(&mut self.components);
        let timeout = self.job.snapshot().timeout();
        let mut gathered = pin!(join_all(components.into_iter().map(|handle| async move {
            let analysis_type = handle.analysis_type();
            (analysis_type, handle.result().await)
        })));

        let first = tokio::time::timeout_at(self.started + timeout, gathered.as_mut()).await;
        let outcomes = match first {
            Ok(outcomes) => outcomes,
            Err(_) => {
                let signal = FailureSignal::timed_out(format!(
                    "no merged result within {} ms",
                    timeout.as_millis()
                ));
                let error = classify(&signal, Utc::now());
                engine_warn!("comprehensive job {} failed: {}", self.job.id, error);
                self.apply(JobMsg::RequestFailed {
                    error,
                    elapsed: self.started.elapsed(),
                });
                gathered.await
            }
        };

        let mut reports = Vec::new();
        let mut failed = Vec::new();
        for (analysis_type, outcome) in outcomes {
            match outcome {
                Ok(report) => reports.push(report),
                Err(error) => {
                    engine_warn!("{} analysis left out of merge: {}", analysis_type, error);
                    failed.push(analysis_type);
                }
            }
        }
        let merged = merge(&reports, &failed, Utc::now());
        self.apply(JobMsg::ResponseReceived {
            report: merged.report.clone(),
            elapsed: self.started.elapsed(),
        });
        merged
    }

    fn apply(&self, msg: JobMsg) {
        let job = &self.job;
        job.dispatcher.apply(job.id, &self.cell, &job.cancel, msg);
    }
}

impl Drop for ComprehensiveRun {
    fn drop(&mut self) {
        self.job.cancel();
    }
}
