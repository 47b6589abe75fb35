use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{AnalysisReport, AnalysisType, ReportDetails, ReportMetadata};

pub const SUMMARY_SEPARATOR: &str = "\n\n";

/// A combined report plus the requested types that did not make it in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedReport {
    pub report: AnalysisReport,
    pub failed_types: Vec<AnalysisType>,
}

impl MergedReport {
    pub fn is_partial(&self) -> bool {
        !self.failed_types.is_empty()
    }
}

/// Merges per-type reports into one `comprehensive` report. Output follows
/// the order in which `reports` are supplied.
pub fn merge(
    reports: &[AnalysisReport],
    failed_types: &[AnalysisType],
    generated_at: DateTime<Utc>,
) -> MergedReport {
    let summary = reports
        .iter()
        .map(|report| report.summary.trim())
        .filter(|summary| !summary.is_empty())
        .collect::<Vec<_>>()
        .join(SUMMARY_SEPARATOR);

    let insights = union(reports.iter().flat_map(|report| &report.insights));
    let recommendations = union(reports.iter().flat_map(|report| &report.recommendations));

    let mut details = ReportDetails::new();
    let mut raw = Map::new();
    for report in reports {
        let prefix = report.analysis_type.name();
        for (key, value) in report.details.iter() {
            details.insert(format!("{prefix}.{key}"), value);
        }
        raw.insert(prefix.to_string(), report.raw_payload.clone());
    }

    let mut models = Vec::new();
    for report in reports {
        let model = report.metadata.model_used.trim();
        if !model.is_empty() && !models.contains(&model) {
            models.push(model);
        }
    }
    let confidence = if reports.is_empty() {
        0.0
    } else {
        reports.iter().map(|r| r.metadata.confidence).sum::<f64>() / reports.len() as f64
    };

    let mut failed = Vec::new();
    for kind in failed_types {
        if !failed.contains(kind) {
            failed.push(*kind);
        }
    }

    MergedReport {
        report: AnalysisReport {
            analysis_type: AnalysisType::Comprehensive,
            summary,
            insights,
            recommendations,
            details,
            raw_payload: Value::Object(raw),
            metadata: ReportMetadata {
                model_used: models.join(", "),
                confidence,
                // Component jobs run concurrently, so the slowest one bounds the total.
                processing_time_ms: reports
                    .iter()
                    .map(|r| r.metadata.processing_time_ms)
                    .max()
                    .unwrap_or(0),
                generated_at,
            },
        },
        failed_types: failed,
    }
}

/// Trimmed, de-duplicated, first occurrence wins.
fn union<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .map(|item| item.trim())
        .filter(|item| !item.is_empty() && seen.insert(item.to_string()))
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_trims_and_drops_duplicates() {
        let items = vec![
            " a ".to_string(),
            "b".to_string(),
            "a".to_string(),
            "  ".to_string(),
        ];
        assert_eq!(union(items.iter()), vec!["a".to_string(), "b".to_string()]);
    }
}
