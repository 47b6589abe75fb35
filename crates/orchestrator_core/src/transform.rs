use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{AnalysisReport, AnalysisType, ReportDetails, ReportMetadata};

/// Where each canonical field lives in a backend payload. Every list is
/// tried in order; the first non-empty match wins for scalars, lists are
/// concatenated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub summary: &'static [&'static str],
    pub insights: &'static [&'static str],
    pub recommendations: &'static [&'static str],
    pub details: &'static [&'static str],
}

const BUSINESS: FieldMapping = FieldMapping {
    summary: &["executiveSummary", "summary"],
    insights: &["keyInsights", "insights"],
    recommendations: &["recommendations"],
    details: &["marketPosition", "riskFactors"],
};

const PERFORMANCE: FieldMapping = FieldMapping {
    summary: &["performanceSummary", "summary"],
    insights: &["strengths", "weaknesses"],
    recommendations: &["improvements", "recommendations"],
    details: &["kpis", "benchmark"],
};

const REVENUE: FieldMapping = FieldMapping {
    summary: &["revenueSummary", "summary"],
    insights: &["revenueTrends", "opportunities"],
    recommendations: &["recommendations", "pricingSuggestions"],
    details: &["forecast", "breakdown"],
};

const OCCUPANCY: FieldMapping = FieldMapping {
    summary: &["occupancySummary", "summary"],
    insights: &["metrics", "patterns"],
    recommendations: &["recommendations"],
    details: &["seasonality", "vacancyRisk"],
};

const TRENDS: FieldMapping = FieldMapping {
    summary: &["trendSummary", "summary"],
    insights: &["trends", "emergingPatterns"],
    recommendations: &["actions", "recommendations"],
    details: &["outlook"],
};

const RECOMMENDATIONS: FieldMapping = FieldMapping {
    summary: &["overview", "summary"],
    insights: &["priorities"],
    recommendations: &["recommendations", "actionItems"],
    details: &["timeline", "expectedImpact"],
};

const COMPREHENSIVE: FieldMapping = FieldMapping {
    summary: &["summary"],
    insights: &["insights"],
    recommendations: &["recommendations"],
    details: &[],
};

pub fn field_mapping(analysis_type: AnalysisType) -> &'static FieldMapping {
    match analysis_type {
        AnalysisType::Business => &BUSINESS,
        AnalysisType::Performance => &PERFORMANCE,
        AnalysisType::Revenue => &REVENUE,
        AnalysisType::Occupancy => &OCCUPANCY,
        AnalysisType::Trends => &TRENDS,
        AnalysisType::Recommendations => &RECOMMENDATIONS,
        AnalysisType::Comprehensive => &COMPREHENSIVE,
    }
}

/// Builds the canonical report for one completed job. Missing or oddly
/// typed fields degrade to empty values; this never fails.
pub fn normalize(
    analysis_type: AnalysisType,
    raw_payload: Value,
    processing_time: Duration,
    generated_at: DateTime<Utc>,
) -> AnalysisReport {
    let mapping = field_mapping(analysis_type);
    let empty = Map::new();
    let source = payload_body(&raw_payload).unwrap_or(&empty);

    let summary = mapping
        .summary
        .iter()
        .filter_map(|field| source.get(*field))
        .map(render_scalar)
        .find(|text| !text.is_empty())
        .or_else(|| raw_payload.as_str().map(|text| text.trim().to_string()))
        .unwrap_or_default();

    let insights = collect_items(source, mapping.insights);
    let recommendations = collect_items(source, mapping.recommendations);
    let details = mapping
        .details
        .iter()
        .filter_map(|field| {
            let text = render_scalar(source.get(*field)?);
            (!text.is_empty()).then_some((*field, text))
        })
        .collect::<ReportDetails>();

    let metadata = ReportMetadata {
        model_used: ["modelUsed", "model"]
            .iter()
            .filter_map(|field| source.get(*field).and_then(Value::as_str))
            .map(str::trim)
            .find(|model| !model.is_empty())
            .unwrap_or_default()
            .to_string(),
        confidence: source
            .get("confidence")
            .and_then(Value::as_f64)
            .map(normalize_confidence)
            .unwrap_or(0.0),
        processing_time_ms: u64::try_from(processing_time.as_millis()).unwrap_or(u64::MAX),
        generated_at,
    };

    AnalysisReport {
        analysis_type,
        summary,
        insights,
        recommendations,
        details,
        raw_payload,
        metadata,
    }
}

/// Some endpoints wrap the analysis in `{ success, data }`.
fn payload_body(payload: &Value) -> Option<&Map<String, Value>> {
    let object = payload.as_object()?;
    match object.get("data").and_then(Value::as_object) {
        Some(inner) if object.contains_key("success") => Some(inner),
        _ => Some(object),
    }
}

fn collect_items(source: &Map<String, Value>, fields: &[&str]) -> Vec<String> {
    fields
        .iter()
        .filter_map(|field| source.get(*field))
        .flat_map(|value| match value {
            Value::Array(items) => items.iter().map(render_item).collect::<Vec<_>>(),
            Value::Null => Vec::new(),
            other => vec![render_item(other)],
        })
        .filter(|item| !item.is_empty())
        .collect()
}

fn render_item(value: &Value) -> String {
    match value {
        Value::Object(object) => {
            let title = object.get("title").and_then(Value::as_str);
            let description = object
                .get("description")
                .or_else(|| object.get("detail"))
                .and_then(Value::as_str);
            match (title, description) {
                (Some(title), Some(description)) => {
                    format!("{}: {}", title.trim(), description.trim())
                }
                (Some(text), None) | (None, Some(text)) => text.trim().to_string(),
                (None, None) => value.to_string(),
            }
        }
        other => render_scalar(other),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Backends report either a 0..1 ratio or a percentage.
fn normalize_confidence(raw: f64) -> f64 {
    let ratio = if raw > 1.0 { raw / 100.0 } else { raw };
    ratio.clamp(0.0, 1.0)
}
