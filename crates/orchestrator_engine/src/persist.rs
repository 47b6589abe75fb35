use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use engine_logging::engine_info;
use orchestrator_core::{AnalysisReport, MergedReport};
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Creates `dir` when missing and checks that reports can be written there.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    let unusable = |err: io::Error| PersistError::OutputDir(format!("{}: {err}", dir.display()));
    match fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => {
            return Err(PersistError::OutputDir(format!("{} is not a directory", dir.display())));
        }
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(unusable)?;
        }
        Err(err) => return Err(unusable(err)),
    }
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(unusable)?;
    Ok(())
}

const TEMP_PREFIX: &str = ".report-";

/// Writes reports into one directory. Each file is staged under a hidden
/// temp name and renamed over the target, so readers never see a partial
/// report.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut staged: NamedTempFile = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.dir)?;
        staged.write_all(content.as_bytes())?;
        staged.as_file_mut().sync_all()?;
        staged
            .persist(&target)
            .map_err(|err| PersistError::Io(err.error))?;
        Ok(target)
    }
}

/// `{type}-{generatedAt}.json`, e.g. `occupancy-20240101T120000Z.json`.
pub fn report_filename(report: &AnalysisReport) -> String {
    format!(
        "{}-{}.json",
        report.analysis_type.name(),
        report.metadata.generated_at.format("%Y%m%dT%H%M%SZ")
    )
}

/// Exports the canonical report, raw payload included, as pretty JSON.
pub fn export_report(dir: &Path, report: &AnalysisReport) -> Result<PathBuf, PersistError> {
    write_json(dir, &report_filename(report), report)
}

/// Exports a merged report together with the component types that failed.
pub fn export_merged_report(dir: &Path, merged: &MergedReport) -> Result<PathBuf, PersistError> {
    write_json(dir, &report_filename(&merged.report), merged)
}

fn write_json<T: Serialize>(
    dir: &Path,
    filename: &str,
    value: &T,
) -> Result<PathBuf, PersistError> {
    let content = serde_json::to_string_pretty(value)?;
    let path = AtomicFileWriter::new(dir.to_path_buf()).write(filename, &content)?;
    engine_info!("exported report to {:?}", path);
    Ok(path)
}
