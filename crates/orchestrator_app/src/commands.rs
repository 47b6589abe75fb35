use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use engine_logging::{engine_error, engine_info, engine_warn};
use orchestrator_core::stream::StreamState;
use orchestrator_core::{stage_plan, AnalysisType, JobState};
use orchestrator_engine::{
    export_merged_report, export_report, JobHandle, Orchestrator, StreamEndpoint, StreamKind,
};

pub async fn health(orchestrator: &Orchestrator) -> Result<()> {
    let status = orchestrator.check_availability().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    if !status.available {
        bail!("AI service is {:?}: {}", status.status, status.message);
    }
    Ok(())
}

pub async fn run(
    orchestrator: &Orchestrator,
    types: &[String],
    timeout_ms: Option<u64>,
    export: Option<&Path>,
) -> Result<()> {
    let timeout = timeout_ms.map(Duration::from_millis);
    let dispatcher = orchestrator.dispatcher();

    let mut handles = Vec::with_capacity(types.len());
    for name in types {
        let handle = dispatcher
            .start_named(name, timeout)
            .with_context(|| format!("cannot start `{name}`"))?;
        watch_progress(&handle);
        handles.push(handle);
    }

    let job_ids: Vec<_> = handles.iter().map(JobHandle::id).collect();
    let canceller = dispatcher.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            engine_warn!("interrupted, cancelling {} jobs", job_ids.len());
            for job_id in job_ids {
                canceller.cancel(job_id);
            }
        }
    });

    let mut failed = 0;
    for handle in handles {
        let analysis_type = handle.analysis_type();
        match handle.result().await {
            Ok(report) => {
                println!("{}", serde_json::to_string_pretty(&report)?);
                if let Some(dir) = export {
                    export_report(dir, &report)
                        .with_context(|| format!("failed to export {analysis_type} report"))?;
                }
            }
            Err(error) => {
                engine_error!("{} analysis failed: {}", analysis_type, error);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} analyses failed", types.len());
    }
    Ok(())
}

pub async fn comprehensive(
    orchestrator: &Orchestrator,
    types: &[String],
    timeout_ms: Option<u64>,
    export: Option<&Path>,
) -> Result<()> {
    let types = types
        .iter()
        .map(|name| name.parse::<AnalysisType>())
        .collect::<Result<Vec<_>, _>>()?;
    let timeout = timeout_ms.map(Duration::from_millis);

    let dispatcher = orchestrator.dispatcher();
    let run = dispatcher.start_comprehensive(&types, timeout)?;
    let run_id = run.id();
    let state = run.subscribe();
    let canceller = dispatcher.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            engine_warn!("interrupted, cancelling comprehensive job {}", run_id);
            canceller.cancel(run_id);
        }
    });

    let merged = run.result().await;
    if state.borrow().state() == JobState::Cancelled {
        bail!("comprehensive analysis cancelled");
    }
    println!("{}", serde_json::to_string_pretty(&merged)?);
    if let Some(dir) = export {
        export_merged_report(dir, &merged).context("failed to export merged report")?;
    }
    if merged.is_partial() {
        engine_warn!("partial result, failed types: {:?}", merged.failed_types);
    }
    Ok(())
}

pub async fn stream(
    orchestrator: &Orchestrator,
    kind: &str,
    params: &[(String, String)],
) -> Result<()> {
    let kind: StreamKind = kind.parse()?;
    let endpoint = params
        .iter()
        .fold(StreamEndpoint::new(kind), |endpoint, (key, value)| {
            endpoint.with_param(key, value)
        });

    let consumer = orchestrator.stream();
    let mut receiver = consumer.subscribe();
    orchestrator
        .connect_stream(&endpoint)
        .context("invalid stream endpoint")?;

    let mut printed = 0;
    let mut last_status = String::new();
    loop {
        tokio::select! {
            changed = receiver.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                consumer.disconnect();
                break;
            }
        }
        let session = receiver.borrow_and_update().clone();
        if session.status() != last_status {
            last_status = session.status().to_string();
            engine_info!("stream status: {}", last_status);
        }
        if let Some(fresh) = session.content().get(printed..) {
            print!("{fresh}");
            std::io::stdout().flush()?;
            printed = session.content().len();
        }
        if !session.state().is_open() {
            break;
        }
    }
    println!();

    let session = consumer.session();
    match session.state() {
        StreamState::Completed => Ok(()),
        StreamState::Error => bail!(
            "stream failed: {}",
            session.error().unwrap_or("unknown error")
        ),
        other => bail!("stream ended early ({other:?})"),
    }
}

/// Logs each stage change of a job as it happens.
fn watch_progress(handle: &JobHandle) {
    let mut receiver = handle.subscribe();
    let stages = stage_plan(handle.analysis_type());
    tokio::spawn(async move {
        let mut last_stage = None;
        while receiver.changed().await.is_ok() {
            let job = receiver.borrow_and_update().clone();
            if job.state().is_terminal() {
                break;
            }
            if last_stage != Some(job.stage_index()) {
                last_stage = Some(job.stage_index());
                let label = stages
                    .get(job.stage_index())
                    .map_or("", |stage| stage.label);
                engine_info!(
                    "job {} [{}] {}% {}",
                    job.id(),
                    job.analysis_type(),
                    job.progress_percent(),
                    label
                );
            }
        }
    });
}
