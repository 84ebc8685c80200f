use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The three per-ticker sub-documents, each present only if its fetch succeeded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationBundle {
    pub summary: Option<Value>,
    pub price_guidance: Option<Value>,
    pub investment_rating: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    Full,
    Partial,
    Failed,
}

impl RecommendationBundle {
    pub fn present_count(&self) -> usize {
        [&self.summary, &self.price_guidance, &self.investment_rating]
            .into_iter()
            .filter(|d| d.is_some())
            .count()
    }

    pub fn status(&self) -> CollectionStatus {
        match self.present_count() {
            3 => CollectionStatus::Full,
            0 => CollectionStatus::Failed,
            _ => CollectionStatus::Partial,
        }
    }
}

/// Ticker-keyed output mappings, one per sub-document kind.
///
/// Keys are kept sorted so every flush of the same content serializes to the
/// same bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationMaps {
    pub summary: BTreeMap<String, Value>,
    pub price_guidance: BTreeMap<String, Value>,
    pub investment_rating: BTreeMap<String, Value>,
}

impl RecommendationMaps {
    pub fn insert(&mut self, ticker: &str, bundle: RecommendationBundle) {
        if let Some(v) = bundle.summary {
            self.summary.insert(ticker.to_string(), v);
        }
        if let Some(v) = bundle.price_guidance {
            self.price_guidance.insert(ticker.to_string(), v);
        }
        if let Some(v) = bundle.investment_rating {
            self.investment_rating.insert(ticker.to_string(), v);
        }
    }
}

/// Per-run counters. "Failed" in reports means anything short of a full bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
}

impl RunStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, status: CollectionStatus) {
        self.processed += 1;
        match status {
            CollectionStatus::Full => self.succeeded += 1,
            CollectionStatus::Partial => self.partial += 1,
            CollectionStatus::Failed => self.failed += 1,
        }
    }

    pub fn failures(&self) -> usize {
        self.partial + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_by_present_count() {
        let full = RecommendationBundle {
            summary: Some(json!({})),
            price_guidance: Some(json!({})),
            investment_rating: Some(json!({})),
        };
        assert_eq!(full.status(), CollectionStatus::Full);

        let partial = RecommendationBundle {
            price_guidance: None,
            ..full.clone()
        };
        assert_eq!(partial.status(), CollectionStatus::Partial);

        assert_eq!(RecommendationBundle::default().status(), CollectionStatus::Failed);
    }

    #[test]
    fn insert_only_fills_present_documents() {
        let mut maps = RecommendationMaps::default();
        maps.insert(
            "AAPL",
            RecommendationBundle {
                summary: Some(json!({"s": 1})),
                price_guidance: None,
                investment_rating: Some(json!({"r": 1})),
            },
        );
        assert!(maps.summary.contains_key("AAPL"));
        assert!(!maps.price_guidance.contains_key("AAPL"));
        assert!(maps.investment_rating.contains_key("AAPL"));
    }

    #[test]
    fn partial_and_failed_both_count_as_failures() {
        let mut stats = RunStats::new(3);
        stats.record(CollectionStatus::Full);
        stats.record(CollectionStatus::Partial);
        stats.record(CollectionStatus::Failed);
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failures(), 2);
    }
}
