use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Market classification of a listed stock as reported by the upstream API.
///
/// Unknown classifications are kept as their original string so a record
/// survives a parse/serialize cycle unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MarketType {
    Us,
    Kr,
    Other(String),
}

impl From<String> for MarketType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "US" => MarketType::Us,
            "KR" => MarketType::Kr,
            _ => MarketType::Other(s),
        }
    }
}

impl From<MarketType> for String {
    fn from(m: MarketType) -> Self {
        match m {
            MarketType::Us => "US".to_string(),
            MarketType::Kr => "KR".to_string(),
            MarketType::Other(s) => s,
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::Us => f.write_str("US"),
            MarketType::Kr => f.write_str("KR"),
            MarketType::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRecord {
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_type: Option<MarketType>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StockRecord {
    pub fn is_market(&self, market: &MarketType) -> bool {
        self.market_type.as_ref() == Some(market)
    }
}

/// Body of `GET /api/undervalued-stocks/export`.
///
/// Stocks stay as raw JSON so that one malformed record cannot reject the
/// whole list; records are parsed individually when filtered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockListResponse {
    #[serde(default)]
    pub stocks: Option<Vec<Value>>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub data_date: Option<String>,
}

impl StockListResponse {
    /// Stocks of the given market, in upstream order. Records without a
    /// string ticker, and tickers that are blank after trimming, are dropped.
    pub fn filter_market(&self, market: &MarketType) -> Vec<StockRecord> {
        let mut selected = Vec::new();
        for (idx, raw) in self.stocks.iter().flatten().enumerate() {
            let record = match StockRecord::deserialize(raw) {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(index = idx, error = %err, "skipping malformed stock record");
                    continue;
                }
            };
            if record.is_market(market) && !record.ticker.trim().is_empty() {
                selected.push(record);
            }
        }
        selected
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.as_ref().map_or(true, |s| s.is_empty())
    }

    pub fn count(&self) -> u64 {
        self.total_count
            .unwrap_or_else(|| self.stocks.as_ref().map_or(0, |s| s.len() as u64))
    }
}

/// Dated copy of a stock list, stored under `undervalued-stocks/{date}.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockListArchive {
    pub date: String,
    pub last_updated: String,
    pub total_count: u64,
    pub stocks: Vec<Value>,
}
