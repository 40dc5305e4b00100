use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_modules::catalog::{DiseaseEntry, Severity};

/// The structured, displayable outcome of one successful classification.
///
/// Created once, never mutated; ownership moves into the `ResultHistory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// The catalog identifier of the detected disease.
    pub disease: String,
    /// The catalog display name.
    pub name: String,
    /// Confidence in `[0, 1]`, rounded to two decimals.
    pub confidence: f64,
    pub severity: Severity,
    pub description: String,
    pub treatment: String,
    /// When the classification completed.
    pub timestamp: DateTime<Utc>,
}

impl DetectionResult {
    /// Builds a result whose metadata is copied verbatim from `entry`.
    pub fn from_entry(entry: &DiseaseEntry, confidence: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            disease: entry.id.clone(),
            name: entry.name.clone(),
            confidence: round_confidence(confidence),
            severity: entry.severity,
            description: entry.description.clone(),
            treatment: entry.treatment.clone(),
            timestamp,
        }
    }

    /// Confidence as a percentage with one decimal, e.g. `"87.0%"`.
    pub fn confidence_percent(&self) -> String {
        format!("{:.1}%", self.confidence * 100.0)
    }
}

/// Rounds to two decimals and keeps the value inside `[0, 1]`.
pub fn round_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    ((value * 100.0).round() / 100.0).clamp(0.0, 1.0)
}
