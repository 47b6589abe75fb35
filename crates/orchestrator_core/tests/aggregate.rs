use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use orchestrator_core::{merge, normalize, AnalysisReport, AnalysisType, SUMMARY_SEPARATOR};
use pretty_assertions::assert_eq;
use serde_json::json;

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
}

fn revenue() -> AnalysisReport {
    normalize(
        AnalysisType::Revenue,
        json!({
            "revenueSummary": "Revenue up 4%",
            "revenueTrends": ["Summer peak", " Late payments down "],
            "recommendations": ["Raise deposit", "Offer autopay"],
            "forecast": "stable",
            "model": "analyst-v2",
            "confidence": 0.8
        }),
        Duration::from_millis(1500),
        at(),
    )
}

fn occupancy() -> AnalysisReport {
    normalize(
        AnalysisType::Occupancy,
        json!({
            "occupancySummary": "Occupancy at 92%",
            "metrics": ["Summer peak", "Wing B underused"],
            "recommendations": ["Offer autopay", ""],
            "seasonality": "strong",
            "model": "analyst-v2",
            "confidence": 0.6
        }),
        Duration::from_millis(4000),
        at(),
    )
}

fn as_set(items: &[String]) -> BTreeSet<String> {
    items.iter().cloned().collect()
}

#[test]
fn merge_concatenates_and_unions() {
    let merged = merge(&[revenue(), occupancy()], &[], at());
    let report = &merged.report;

    assert_eq!(report.analysis_type, AnalysisType::Comprehensive);
    assert_eq!(
        report.summary,
        format!("Revenue up 4%{SUMMARY_SEPARATOR}Occupancy at 92%")
    );
    assert_eq!(
        report.insights,
        vec![
            "Summer peak".to_string(),
            "Late payments down".to_string(),
            "Wing B underused".to_string(),
        ]
    );
    assert_eq!(
        report.recommendations,
        vec!["Raise deposit".to_string(), "Offer autopay".to_string()]
    );
    assert_eq!(
        report.details.keys().collect::<Vec<_>>(),
        vec!["revenue.forecast", "occupancy.seasonality"]
    );
    assert_eq!(report.metadata.model_used, "analyst-v2");
    assert_eq!(report.metadata.processing_time_ms, 4000);
    assert!((report.metadata.confidence - 0.7).abs() < 1e-9);
    assert_eq!(report.raw_payload["occupancy"]["seasonality"], "strong");
    assert!(!merged.is_partial());
}

#[test]
fn merge_is_commutative_on_sets() {
    let ab = merge(&[revenue(), occupancy()], &[], at());
    let ba = merge(&[occupancy(), revenue()], &[], at());

    assert_eq!(as_set(&ab.report.insights), as_set(&ba.report.insights));
    assert_eq!(
        as_set(&ab.report.recommendations),
        as_set(&ba.report.recommendations)
    );
    let ab_keys: BTreeSet<_> = ab.report.details.keys().collect();
    let ba_keys: BTreeSet<_> = ba.report.details.keys().collect();
    assert_eq!(ab_keys, ba_keys);
}

#[test]
fn merge_is_idempotent_on_sets() {
    let once = merge(&[revenue()], &[], at());
    let twice = merge(&[revenue(), revenue()], &[], at());
    assert_eq!(once.report.insights, twice.report.insights);
    assert_eq!(once.report.recommendations, twice.report.recommendations);
}

#[test]
fn failed_types_are_exposed_for_partial_success() {
    let merged = merge(
        &[revenue()],
        &[AnalysisType::Trends, AnalysisType::Business, AnalysisType::Trends],
        at(),
    );
    assert!(merged.is_partial());
    assert_eq!(
        merged.failed_types,
        vec![AnalysisType::Trends, AnalysisType::Business]
    );
}

#[test]
fn empty_summaries_are_skipped_and_empty_merge_is_blank() {
    let blank = normalize(AnalysisType::Trends, json!({}), Duration::ZERO, at());
    let merged = merge(&[blank, revenue()], &[], at());
    assert_eq!(merged.report.summary, "Revenue up 4%");

    let empty = merge(&[], &[AnalysisType::Revenue], at());
    assert_eq!(empty.report.summary, "");
    assert_eq!(empty.report.metadata.confidence, 0.0);
    assert_eq!(empty.report.metadata.processing_time_ms, 0);
}
