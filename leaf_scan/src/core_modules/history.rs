// THEORY:
// The `ResultHistory` is the only place results live after classification.
// It is an append-only, newest-first log:
//
// 1.  **Insertion order is the only order**: `append` pushes to the front and
//     nothing ever re-sorts, deduplicates or edits an entry.
// 2.  **Unbounded by default**: a long session keeps everything. `bounded`
//     opts into dropping the oldest entry once a limit is reached, which is
//     an observable behaviour change and therefore never the default.
// 3.  **Read-only consumers**: the display surface reads `latest` for the
//     headline result and `recent` for the "previous results" strip.

use std::collections::VecDeque;

use crate::core_modules::detection::DetectionResult;

#[derive(Debug, Clone, Default)]
pub struct ResultHistory {
    entries: VecDeque<DetectionResult>,
    limit: Option<usize>,
}

impl ResultHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A history that evicts its oldest entry beyond `limit` (at least 1).
    pub fn bounded(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            entries: VecDeque::with_capacity(limit),
            limit: Some(limit),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Prepends `result` as the newest entry.
    pub fn append(&mut self, result: DetectionResult) {
        self.entries.push_front(result);
        if let Some(limit) = self.limit {
            self.entries.truncate(limit);
        }
    }

    /// The newest entry, or `None` before the first classification.
    pub fn latest(&self) -> Option<&DetectionResult> {
        self.entries.front()
    }

    /// Up to `n` entries after the newest one, newest first.
    pub fn recent(&self, n: usize) -> Vec<&DetectionResult> {
        self.entries.iter().skip(1).take(n).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetectionResult> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::catalog::DiseaseCatalog;
    use chrono::Utc;

    fn result(id: &str, confidence: f64) -> DetectionResult {
        let catalog = DiseaseCatalog::global();
        DetectionResult::from_entry(catalog.lookup(id).unwrap(), confidence, Utc::now())
    }

    #[test]
    fn empty_history_has_no_latest() {
        let history = ResultHistory::new();
        assert!(history.latest().is_none());
        assert!(history.recent(5).is_empty());
        assert_eq!(history.limit(), None);
    }

    #[test]
    fn latest_is_newest_and_recent_excludes_it() {
        let mut history = ResultHistory::new();
        let r1 = result("Healthy", 0.71);
        let r2 = result("Leaf Mold", 0.9);
        history.append(r1.clone());
        history.append(r2.clone());

        assert_eq!(history.latest(), Some(&r2));
        let recent = history.recent(5);
        assert_eq!(recent, vec![&r1]);
        assert!(!recent.contains(&&r2));
    }

    #[test]
    fn recent_keeps_insertion_order_and_caps_at_n() {
        let mut history = ResultHistory::new();
        let ids = ["Healthy", "Late Blight", "Early Blight", "Leaf Mold", "Bacterial Spot", "Mosaic Virus", "Healthy"];
        for id in ids {
            history.append(result(id, 0.8));
        }
        let recent: Vec<&str> = history.recent(5).into_iter().map(|r| r.disease.as_str()).collect();
        assert_eq!(recent, ["Mosaic Virus", "Bacterial Spot", "Leaf Mold", "Early Blight", "Late Blight"]);
        assert_eq!(history.len(), 7);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut history = ResultHistory::new();
        let same = result("Healthy", 0.75);
        history.append(same.clone());
        history.append(same.clone());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn bounded_history_drops_the_oldest() {
        let mut history = ResultHistory::bounded(2);
        history.append(result("Healthy", 0.7));
        history.append(result("Leaf Mold", 0.7));
        history.append(result("Mosaic Virus", 0.7));
        let ids: Vec<&str> = history.iter().map(|r| r.disease.as_str()).collect();
        assert_eq!(ids, ["Mosaic Virus", "Leaf Mold"]);
    }
}
