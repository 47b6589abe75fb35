use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeout applied to analysis types without a dedicated entry in the table.
pub const DEFAULT_TIMEOUT_MS: u64 = 600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Business,
    Performance,
    Revenue,
    Occupancy,
    Trends,
    Recommendations,
    Comprehensive,
}

impl AnalysisType {
    /// Every type that maps onto a single backend endpoint.
    pub const COMPONENTS: [AnalysisType; 6] = [
        AnalysisType::Business,
        AnalysisType::Performance,
        AnalysisType::Revenue,
        AnalysisType::Occupancy,
        AnalysisType::Trends,
        AnalysisType::Recommendations,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AnalysisType::Business => "business",
            AnalysisType::Performance => "performance",
            AnalysisType::Revenue => "revenue",
            AnalysisType::Occupancy => "occupancy",
            AnalysisType::Trends => "trends",
            AnalysisType::Recommendations => "recommendations",
            AnalysisType::Comprehensive => "comprehensive",
        }
    }

    /// Path segment under `/ai-analytics/`. `Comprehensive` has none: it fans
    /// out to the component endpoints.
    pub fn endpoint(self) -> Option<&'static str> {
        match self {
            AnalysisType::Business => Some("business-insights"),
            AnalysisType::Performance => Some("performance-analysis"),
            AnalysisType::Revenue => Some("revenue-analysis"),
            AnalysisType::Occupancy => Some("occupancy-analysis"),
            AnalysisType::Trends => Some("trend-analysis"),
            AnalysisType::Recommendations => Some("recommendations"),
            AnalysisType::Comprehensive => None,
        }
    }

    pub fn default_timeout(self) -> Duration {
        let ms = match self {
            AnalysisType::Occupancy => 360_000,
            AnalysisType::Performance | AnalysisType::Revenue => 480_000,
            AnalysisType::Recommendations => 900_000,
            AnalysisType::Comprehensive => 1_200_000,
            AnalysisType::Business | AnalysisType::Trends => DEFAULT_TIMEOUT_MS,
        };
        Duration::from_millis(ms)
    }

    /// Typical wall-clock time of a run; drives the simulated stage schedule.
    pub fn estimated_duration(self) -> Duration {
        let secs = match self {
            AnalysisType::Occupancy => 180,
            AnalysisType::Performance | AnalysisType::Revenue => 240,
            AnalysisType::Business | AnalysisType::Trends => 300,
            AnalysisType::Recommendations => 450,
            AnalysisType::Comprehensive => 600,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown analysis type: {0}")]
pub struct ParseAnalysisTypeError(pub String);

impl FromStr for AnalysisType {
    type Err = ParseAnalysisTypeError;

    /// Accepts both the short name and the endpoint slug.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let needle = raw.trim().to_ascii_lowercase();
        AnalysisType::COMPONENTS
            .into_iter()
            .chain(std::iter::once(AnalysisType::Comprehensive))
            .find(|kind| kind.name() == needle || kind.endpoint() == Some(needle.as_str()))
            .ok_or_else(|| ParseAnalysisTypeError(raw.to_string()))
    }
}
