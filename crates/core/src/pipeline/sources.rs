//! Auxiliary documents collected alongside the stock list: featured picks,
//! latest filings, ETFs with their detail pages and per-profile backtest
//! performance. A failing source is replaced by an empty placeholder document
//! and never aborts the run.

use crate::domain::metadata::{
    SourceStats, SOURCE_BACKTEST_PERFORMANCE, SOURCE_ETFS, SOURCE_FEATURED_STOCKS,
    SOURCE_FILINGS,
};
use crate::fetch::{FetchOutcome, JsonSource, Pacer};
use crate::storage::json_store::{
    BACKTEST_PERFORMANCE_FILE, ETFS_DETAILED_FILE, ETFS_FILE, FEATURED_STOCKS_FILE, FILINGS_FILE,
};
use crate::storage::OutputStore;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const FEATURED_PATH: &str = "/api/undervalued-stocks/featured";
pub const FILINGS_PATH: &str = "/api/sec-filings/latest";
pub const BACKTEST_PATH_PREFIX: &str = "/api/v1/stock/backtest/profile-performance";
pub const ETFS_PATH: &str = "/api/v1/etfs";

pub const DEFAULT_BACKTEST_PROFILES: [&str; 7] = [
    "undervalued_quality",
    "value_basic",
    "value_strict",
    "growth_quality",
    "momentum",
    "swing",
    "ai_transformation",
];

/// A list endpoint whose array body is re-wrapped as
/// `{ lastUpdated, totalCount, <items_key>: [...] }`.
pub struct ListSource {
    pub name: &'static str,
    pub path: &'static str,
    pub limit: usize,
    pub file: &'static str,
    pub items_key: &'static str,
}

pub fn featured_stocks(limit: usize) -> ListSource {
    ListSource {
        name: SOURCE_FEATURED_STOCKS,
        path: FEATURED_PATH,
        limit,
        file: FEATURED_STOCKS_FILE,
        items_key: "stocks",
    }
}

pub fn latest_filings(limit: usize) -> ListSource {
    ListSource {
        name: SOURCE_FILINGS,
        path: FILINGS_PATH,
        limit,
        file: FILINGS_FILE,
        items_key: "filings",
    }
}

fn list_document(items_key: &str, items: Vec<Value>) -> Value {
    let mut doc = Map::new();
    doc.insert("lastUpdated".to_string(), json!(Utc::now().to_rfc3339()));
    doc.insert("totalCount".to_string(), json!(items.len()));
    doc.insert(items_key.to_string(), Value::Array(items));
    Value::Object(doc)
}

/// Fetches one list source and writes its document. Returns the metadata
/// entry, or `None` when the source failed and a placeholder was written.
pub async fn collect_list(
    source: &dyn JsonSource,
    store: &OutputStore,
    list: &ListSource,
) -> anyhow::Result<Option<SourceStats>> {
    let outcome = source
        .fetch_json(list.path, &[("limit", list.limit.to_string())])
        .await;

    let items = match outcome {
        FetchOutcome::Found(Value::Array(items)) => Some(items),
        FetchOutcome::Found(other) => {
            tracing::warn!(
                source = list.name,
                kind = json_kind(&other),
                "expected a JSON array; writing empty document"
            );
            None
        }
        FetchOutcome::NotFound | FetchOutcome::Failed(_) => None,
    };

    match items {
        Some(items) => {
            let count = items.len() as u64;
            store
                .write_json(list.file, &list_document(list.items_key, items))
                .await?;
            tracing::info!(source = list.name, count, "saved auxiliary source");
            Ok(Some(SourceStats::new(count, Utc::now().to_rfc3339())))
        }
        None => {
            store
                .write_json(list.file, &list_document(list.items_key, Vec::new()))
                .await?;
            tracing::warn!(source = list.name, "auxiliary source failed; wrote empty document");
            Ok(None)
        }
    }
}

/// Fetches backtest performance for each profile in order, pacing between
/// calls, and writes `{ lastUpdated, count, data: {profile: doc} }`.
pub async fn collect_backtest_performance(
    source: &dyn JsonSource,
    store: &OutputStore,
    pacer: &Pacer,
    profiles: &[String],
    years: u32,
) -> anyhow::Result<SourceStats> {
    let mut data = BTreeMap::<String, Value>::new();
    let mut failures: u64 = 0;

    for (idx, profile) in profiles.iter().enumerate() {
        let path = format!("{BACKTEST_PATH_PREFIX}/{profile}");
        match source
            .fetch_json(&path, &[("years", years.to_string())])
            .await
            .into_option()
        {
            Some(doc) => {
                data.insert(profile.clone(), doc);
                tracing::debug!(processed = idx + 1, total = profiles.len(), %profile, "fetched backtest performance");
            }
            None => {
                failures += 1;
                tracing::warn!(%profile, "backtest performance unavailable; skipping profile");
            }
        }
        pacer.pace().await;
    }

    let count = data.len() as u64;
    store
        .write_json(
            BACKTEST_PERFORMANCE_FILE,
            &json!({
                "lastUpdated": Utc::now().to_rfc3339(),
                "count": count,
                "data": data,
            }),
        )
        .await?;
    tracing::info!(
        source = SOURCE_BACKTEST_PERFORMANCE,
        count,
        failures,
        "saved auxiliary source"
    );

    Ok(SourceStats {
        failed: Some(failures),
        ..SourceStats::new(count, Utc::now().to_rfc3339())
    })
}

/// Fetches the ETF list, then each ETF's detail document in list order.
///
/// Writes `etfs.json` as `{ lastUpdated, count, data: [...] }` and
/// `etfs-detailed.json` as `{ lastUpdated, count, data: {ticker: doc} }`. A
/// detail miss keeps the list record for that ticker. When the list itself is
/// unavailable both files get empty placeholders and `None` is returned.
pub async fn collect_etfs(
    source: &dyn JsonSource,
    store: &OutputStore,
    pacer: &Pacer,
) -> anyhow::Result<Option<SourceStats>> {
    let listing = source
        .fetch_json(ETFS_PATH, &[])
        .await
        .into_option()
        .and_then(etf_listing);

    let Some((etfs, count)) = listing else {
        let now = Utc::now().to_rfc3339();
        store
            .write_json(ETFS_FILE, &json!({"lastUpdated": now, "count": 0, "data": []}))
            .await?;
        store
            .write_json(
                ETFS_DETAILED_FILE,
                &json!({"lastUpdated": now, "count": 0, "data": {}}),
            )
            .await?;
        tracing::warn!(source = SOURCE_ETFS, "ETF list unavailable; wrote empty documents");
        return Ok(None);
    };

    store
        .write_json(
            ETFS_FILE,
            &json!({
                "lastUpdated": Utc::now().to_rfc3339(),
                "count": count,
                "data": etfs,
            }),
        )
        .await?;
    tracing::info!(source = SOURCE_ETFS, count, "fetching ETF details");

    let mut details = BTreeMap::<String, Value>::new();
    let mut fetched: u64 = 0;
    let mut failed: u64 = 0;
    let total = etfs.len();

    for (idx, etf) in etfs.iter().enumerate() {
        let Some(ticker) = etf.get("ticker").and_then(Value::as_str) else {
            tracing::warn!(index = idx, "ETF record has no ticker; skipping");
            continue;
        };

        match source
            .fetch_json(&format!("{ETFS_PATH}/{ticker}"), &[])
            .await
            .into_option()
        {
            Some(doc) => {
                details.insert(ticker.to_string(), doc);
                fetched += 1;
                if (idx + 1) % 10 == 0 {
                    tracing::info!(processed = idx + 1, total, %ticker, "ETF details progress");
                }
            }
            None => {
                tracing::warn!(%ticker, "ETF detail unavailable; keeping list record");
                details.insert(ticker.to_string(), etf.clone());
                failed += 1;
            }
        }
        pacer.pace().await;
    }

    store
        .write_json(
            ETFS_DETAILED_FILE,
            &json!({
                "lastUpdated": Utc::now().to_rfc3339(),
                "count": count,
                "data": details,
            }),
        )
        .await?;
    tracing::info!(source = SOURCE_ETFS, count, fetched, failed, "saved auxiliary source");

    Ok(Some(SourceStats {
        details_fetched: Some(fetched),
        details_failed: Some(failed),
        ..SourceStats::new(count, Utc::now().to_rfc3339())
    }))
}

/// Accepts either a bare array or `{ count?, data: [...] }`.
fn etf_listing(body: Value) -> Option<(Vec<Value>, u64)> {
    let declared = body.get("count").and_then(Value::as_u64);
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };
    let count = declared.unwrap_or(items.len() as u64);
    Some((items, count))
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::fetch::HttpJsonSource;

    fn read(store: &OutputStore, rel: &str) -> Value {
        serde_json::from_slice(&std::fs::read(store.path(rel)).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn wraps_list_source_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(FILINGS_PATH))
            .and(query_param("limit", "20"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let http = HttpJsonSource::new(server.uri(), Duration::from_secs(5)).unwrap();

        let stats = collect_list(&http, &store, &latest_filings(20))
            .await
            .unwrap()
            .expect("stats");

        assert_eq!(stats.count, 2);
        let doc = read(&store, FILINGS_FILE);
        assert_eq!(doc["totalCount"], 2);
        assert_eq!(doc["filings"][1]["id"], 2);
    }

    #[tokio::test]
    async fn failed_list_source_writes_placeholder() {
        let server = MockServer::start().await;
        Mock::given(path(FEATURED_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let http = HttpJsonSource::new(server.uri(), Duration::from_secs(5)).unwrap();

        let stats = collect_list(&http, &store, &featured_stocks(10)).await.unwrap();

        assert!(stats.is_none());
        let doc = read(&store, FEATURED_STOCKS_FILE);
        assert_eq!(doc["totalCount"], 0);
        assert_eq!(doc["stocks"], json!([]));
    }

    #[tokio::test]
    async fn backtest_skips_failed_profiles() {
        let server = MockServer::start().await;
        Mock::given(path(format!("{BACKTEST_PATH_PREFIX}/momentum")))
            .and(query_param("years", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cagr": 0.12})))
            .mount(&server)
            .await;
        Mock::given(path(format!("{BACKTEST_PATH_PREFIX}/swing")))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let http = HttpJsonSource::new(server.uri(), Duration::from_secs(5)).unwrap();
        let profiles = vec!["momentum".to_string(), "swing".to_string()];

        let stats = collect_backtest_performance(
            &http,
            &store,
            &Pacer::new(Duration::ZERO),
            &profiles,
            3,
        )
        .await
        .unwrap();

        assert_eq!(stats.count, 1);
        assert_eq!(stats.failed, Some(1));
        let doc = read(&store, BACKTEST_PERFORMANCE_FILE);
        assert_eq!(doc["data"]["momentum"]["cagr"], 0.12);
        assert!(doc["data"].get("swing").is_none());
    }

    #[tokio::test]
    async fn etf_details_fall_back_to_list_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ETFS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 2,
                "data": [
                    {"ticker": "SPY", "name": "S&P 500"},
                    {"ticker": "QQQ", "name": "Nasdaq 100"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(path(format!("{ETFS_PATH}/SPY")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ticker": "SPY", "expenseRatio": 0.09})),
            )
            .mount(&server)
            .await;
        Mock::given(path(format!("{ETFS_PATH}/QQQ")))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let http = HttpJsonSource::new(server.uri(), Duration::from_secs(5)).unwrap();

        let stats = collect_etfs(&http, &store, &Pacer::new(Duration::ZERO))
            .await
            .unwrap()
            .expect("stats");

        assert_eq!(stats.count, 2);
        assert_eq!(stats.details_fetched, Some(1));
        assert_eq!(stats.details_failed, Some(1));

        let list = read(&store, ETFS_FILE);
        assert_eq!(list["count"], 2);
        assert_eq!(list["data"][1]["ticker"], "QQQ");

        let detailed = read(&store, ETFS_DETAILED_FILE);
        assert_eq!(detailed["data"]["SPY"]["expenseRatio"], 0.09);
        assert_eq!(detailed["data"]["QQQ"]["name"], "Nasdaq 100");
    }

    #[tokio::test]
    async fn missing_etf_list_writes_both_placeholders() {
        let server = MockServer::start().await;

        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let http = HttpJsonSource::new(server.uri(), Duration::from_secs(5)).unwrap();

        let stats = collect_etfs(&http, &store, &Pacer::new(Duration::ZERO))
            .await
            .unwrap();

        assert!(stats.is_none());
        assert_eq!(read(&store, ETFS_FILE)["data"], json!([]));
        assert_eq!(read(&store, ETFS_DETAILED_FILE)["data"], json!({}));
    }

    #[test]
    fn etf_listing_accepts_bare_arrays() {
        let (items, count) = etf_listing(json!([{"ticker": "SPY"}])).unwrap();
        assert_eq!((items.len(), count), (1, 1));
        assert!(etf_listing(json!({"data": "nope"})).is_none());
    }
}
