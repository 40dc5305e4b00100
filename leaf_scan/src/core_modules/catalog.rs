// THEORY:
// The `catalog` is the leaf dependency of the pipeline: a static table that
// maps a disease identifier (the label a classifier emits) to the metadata the
// display surface shows. It has no logic beyond lookup.
//
// Key principles:
// 1.  **Single source of truth**: every `DetectionResult` copies severity,
//     description and treatment from here at classification time, so a result
//     can never drift from the catalog it was enriched from.
// 2.  **Strict lookup**: an unmapped label is an error, not a default entry.
//     The random stub only draws known keys, but a real model may not.
// 3.  **Process-wide, read-only**: the built-in table is initialized once on
//     first use and never mutated or torn down.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

static GLOBAL_CATALOG: OnceLock<Arc<DiseaseCatalog>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        })
    }
}

/// Descriptive metadata for one disease label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiseaseEntry {
    /// The unique identifier a classifier emits, e.g. `"Late Blight"`.
    pub id: String,
    /// The display name, e.g. `"Late Blight (Phytophthora infestans)"`.
    pub name: String,
    pub description: String,
    pub treatment: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown disease identifier: {0:?}")]
pub struct UnknownDiseaseError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("a disease catalog needs at least one entry")]
    Empty,
    #[error("duplicate disease identifier: {0:?}")]
    DuplicateId(String),
}

/// An immutable id → `DiseaseEntry` table that preserves insertion order.
#[derive(Debug, Clone)]
pub struct DiseaseCatalog {
    entries: Vec<DiseaseEntry>,
    index: HashMap<String, usize>,
}

impl DiseaseCatalog {
    pub fn new(entries: Vec<DiseaseEntry>) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateId(entry.id.clone()));
            }
        }
        Ok(Self { entries, index })
    }

    /// The built-in six-entry tomato/potato leaf catalog.
    pub fn builtin() -> Self {
        let entries: Vec<DiseaseEntry> = BUILTIN_ENTRIES
            .iter()
            .map(|&(id, name, description, treatment, severity)| DiseaseEntry {
                id: id.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                treatment: treatment.to_string(),
                severity,
            })
            .collect();
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.id.clone(), i))
            .collect();
        Self { entries, index }
    }

    /// The shared built-in catalog.
    pub fn global() -> Arc<Self> {
        GLOBAL_CATALOG.get_or_init(|| Arc::new(Self::builtin())).clone()
    }

    pub fn lookup(&self, id: &str) -> Result<&DiseaseEntry, UnknownDiseaseError> {
        self.index
            .get(id)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| UnknownDiseaseError(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Identifiers in catalog order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.id.as_str())
    }

    pub fn entries(&self) -> &[DiseaseEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const BUILTIN_ENTRIES: &[(&str, &str, &str, &str, Severity)] = &[
    (
        "Healthy",
        "Healthy Leaf",
        "The leaf appears to be healthy with no visible signs of disease.",
        "Continue regular care and monitoring.",
        Severity::Low,
    ),
    (
        "Late Blight",
        "Late Blight (Phytophthora infestans)",
        "A serious disease causing dark, water-soaked lesions on leaves.",
        "Apply copper-based fungicides and remove affected plant parts.",
        Severity::High,
    ),
    (
        "Early Blight",
        "Early Blight (Alternaria solani)",
        "Characterized by brown spots with concentric rings on older leaves.",
        "Use fungicides containing chlorothalonil or copper compounds.",
        Severity::Medium,
    ),
    (
        "Leaf Mold",
        "Leaf Mold (Passalora fulva)",
        "Yellow spots on leaf surfaces with olive-green mold underneath.",
        "Improve air circulation and reduce humidity. Apply fungicides.",
        Severity::Medium,
    ),
    (
        "Bacterial Spot",
        "Bacterial Spot (Xanthomonas)",
        "Small, dark spots with yellow halos on leaves and fruits.",
        "Use copper bactericides and maintain good garden hygiene.",
        Severity::Medium,
    ),
    (
        "Mosaic Virus",
        "Mosaic Virus",
        "Mottled light and dark green areas creating a mosaic pattern.",
        "Remove infected plants and control aphid vectors.",
        Severity::High,
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> DiseaseEntry {
        DiseaseEntry {
            id: id.to_string(),
            name: id.to_string(),
            description: "d".to_string(),
            treatment: "t".to_string(),
            severity: Severity::Low,
        }
    }

    #[test]
    fn every_builtin_entry_is_complete() {
        let catalog = DiseaseCatalog::builtin();
        assert_eq!(catalog.len(), 6);
        for id in catalog.ids() {
            let entry = catalog.lookup(id).expect("builtin id resolves");
            assert_eq!(entry.id, id);
            assert!(!entry.name.is_empty());
            assert!(!entry.description.is_empty());
            assert!(!entry.treatment.is_empty());
            assert!(matches!(entry.severity, Severity::Low | Severity::Medium | Severity::High));
        }
    }

    #[test]
    fn builtin_severities() {
        let catalog = DiseaseCatalog::builtin();
        assert_eq!(catalog.lookup("Healthy").unwrap().severity, Severity::Low);
        assert_eq!(catalog.lookup("Late Blight").unwrap().severity, Severity::High);
        assert_eq!(catalog.lookup("Leaf Mold").unwrap().severity, Severity::Medium);
        assert_eq!(catalog.lookup("Mosaic Virus").unwrap().severity, Severity::High);
    }

    #[test]
    fn unknown_label_is_an_error() {
        let catalog = DiseaseCatalog::builtin();
        assert_eq!(
            catalog.lookup("Powdery Mildew"),
            Err(UnknownDiseaseError("Powdery Mildew".to_string()))
        );
        assert!(!catalog.contains("healthy"));
    }

    #[test]
    fn custom_catalog_rejects_duplicates_and_empty() {
        assert_eq!(
            DiseaseCatalog::new(vec![entry("A"), entry("A")]).unwrap_err(),
            CatalogError::DuplicateId("A".to_string())
        );
        assert_eq!(DiseaseCatalog::new(Vec::new()).unwrap_err(), CatalogError::Empty);
        let ids: Vec<_> = DiseaseCatalog::new(vec![entry("B"), entry("A")]).unwrap().ids().map(String::from).collect();
        assert_eq!(ids, ["B", "A"]);
    }

    #[test]
    fn global_is_shared() {
        assert!(Arc::ptr_eq(&DiseaseCatalog::global(), &DiseaseCatalog::global()));
    }

    #[test]
    fn severity_serializes_as_plain_name() {
        assert_eq!(serde_json::to_string(&Severity::Medium).unwrap(), "\"Medium\"");
    }
}
