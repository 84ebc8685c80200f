use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const SOURCE_UNDERVALUED_STOCKS: &str = "undervaluedStocks";
pub const SOURCE_FEATURED_STOCKS: &str = "featuredStocks";
pub const SOURCE_FILINGS: &str = "filings";
pub const SOURCE_BACKTEST_PERFORMANCE: &str = "backtestPerformance";
pub const SOURCE_RECOMMENDATIONS: &str = "recommendations";
pub const SOURCE_ETFS: &str = "etfs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub last_updated: DateTime<Utc>,
    pub data_date: Option<String>,
    pub sources: MetadataSources,
    pub duration: String,
}

/// `metadata.sources`: per-source counters keyed by source name, plus the
/// index of dated stock-list archives under `historicalData`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_data: Option<HistoricalIndex>,
    #[serde(flatten)]
    pub stats: BTreeMap<String, SourceStats>,
}

impl MetadataSources {
    pub fn insert(&mut self, name: impl Into<String>, stats: SourceStats) {
        self.stats.insert(name.into(), stats);
    }

    pub fn get(&self, name: &str) -> Option<&SourceStats> {
        self.stats.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalIndex {
    /// `YYYY-MM-DD` dates with an archive on disk, ascending.
    pub dates: Vec<String>,
    pub total_dates: usize,
    pub date_range: Option<DateRange>,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

impl HistoricalIndex {
    pub fn new(dates: Vec<String>, updated_at: impl Into<String>) -> Self {
        let date_range = match (dates.first(), dates.last()) {
            (Some(start), Some(end)) => Some(DateRange {
                start: start.clone(),
                end: end.clone(),
            }),
            _ => None,
        };
        Self {
            total_dates: dates.len(),
            dates,
            date_range,
            updated_at: updated_at.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStats {
    pub count: u64,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_fetched: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_failed: Option<u64>,
}

impl SourceStats {
    pub fn new(count: u64, updated_at: impl Into<String>) -> Self {
        Self {
            count,
            updated_at: updated_at.into(),
            failed: None,
            partial: None,
            total: None,
            details_fetched: None,
            details_failed: None,
        }
    }
}

/// Elapsed wall-clock time as seconds with two decimals, e.g. `"12.34s"`.
pub fn format_duration(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn duration_has_two_decimals() {
        assert_eq!(format_duration(Duration::from_millis(1_500)), "1.50s");
        assert_eq!(format_duration(Duration::ZERO), "0.00s");
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let mut sources = MetadataSources::default();
        sources.insert(
            SOURCE_RECOMMENDATIONS.to_string(),
            SourceStats {
                failed: Some(1),
                ..SourceStats::new(11, "2026-01-27T00:00:00Z")
            },
        );
        let meta = RunMetadata {
            last_updated: Utc.with_ymd_and_hms(2026, 1, 27, 0, 0, 0).unwrap(),
            data_date: None,
            sources,
            duration: "1.00s".to_string(),
        };

        let v = serde_json::to_value(&meta).unwrap();
        assert_eq!(v["dataDate"], serde_json::Value::Null);
        assert_eq!(v["sources"]["recommendations"]["count"], 11);
        assert_eq!(v["sources"]["recommendations"]["failed"], 1);
        assert!(v["sources"]["recommendations"].get("partial").is_none());
        assert_eq!(v["lastUpdated"], "2026-01-27T00:00:00Z");
    }

    #[test]
    fn historical_index_sits_beside_source_counters() {
        let mut sources = MetadataSources::default();
        sources.insert(SOURCE_ETFS, SourceStats {
            details_fetched: Some(2),
            details_failed: Some(1),
            ..SourceStats::new(3, "2026-01-27T00:00:00Z")
        });
        sources.historical_data = Some(HistoricalIndex::new(
            vec!["2026-01-24".to_string(), "2026-01-26".to_string()],
            "2026-01-27T00:00:00Z",
        ));

        let v = serde_json::to_value(&sources).unwrap();
        assert_eq!(v["etfs"]["detailsFetched"], 2);
        assert_eq!(v["etfs"]["detailsFailed"], 1);
        assert_eq!(v["historicalData"]["dates"][1], "2026-01-26");
        assert_eq!(v["historicalData"]["totalDates"], 2);
        assert_eq!(v["historicalData"]["dateRange"]["start"], "2026-01-24");

        let back: MetadataSources = serde_json::from_value(v).unwrap();
        assert_eq!(back, sources);
    }

    #[test]
    fn empty_history_has_null_range() {
        let idx = HistoricalIndex::new(Vec::new(), "2026-01-27T00:00:00Z");
        let v = serde_json::to_value(&idx).unwrap();
        assert_eq!(v["dates"], serde_json::json!([]));
        assert_eq!(v["dateRange"], serde_json::Value::Null);
    }
}
