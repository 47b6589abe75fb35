use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::AnalysisType;

/// Canonical, type-uniform representation of a backend analysis payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    #[serde(rename = "type")]
    pub analysis_type: AnalysisType,
    pub summary: String,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub details: ReportDetails,
    pub raw_payload: Value,
    pub metadata: ReportMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub model_used: String,
    pub confidence: f64,
    pub processing_time_ms: u64,
    pub generated_at: DateTime<Utc>,
}

/// String map that keeps insertion order; serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportDetails {
    entries: Vec<(String, String)>,
}

impl ReportDetails {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the value in place when the key already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ReportDetails {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut details = ReportDetails::new();
        for (key, value) in iter {
            details.insert(key, value);
        }
        details
    }
}

impl Serialize for ReportDetails {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::ReportDetails;

    #[test]
    fn details_keep_insertion_order_and_replace_in_place() {
        let mut details = ReportDetails::new();
        details.insert("zeta", "1");
        details.insert("alpha", "2");
        details.insert("zeta", "3");
        assert_eq!(details.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        assert_eq!(details.get("zeta"), Some("3"));
        assert_eq!(
            serde_json::to_string(&details).unwrap(),
            r#"{"zeta":"3","alpha":"2"}"#
        );
    }
}
