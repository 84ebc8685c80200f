//! Backfill of dated stock-list archives under `undervalued-stocks/`.
//!
//! Walks every day from `months` before the data date up to (not including)
//! the data date itself, which stage 1 already archived. Dates already on
//! disk are not fetched again and days with no stocks get no file.

use crate::domain::metadata::HistoricalIndex;
use crate::domain::stock::StockListArchive;
use crate::fetch::{JsonSource, Pacer};
use crate::pipeline::orchestrator::STOCK_LIST_PATH;
use crate::storage::json_store::archive_file;
use crate::storage::OutputStore;
use chrono::{Months, NaiveDate, Utc};
use serde_json::Value;

pub const LATEST_DATE_PATH: &str = "/api/undervalued-stocks/latest-date";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses the date part of `YYYY-MM-DD` or an RFC 3339 timestamp.
pub fn parse_data_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.get(..10)?, DATE_FORMAT).ok()
}

/// Days from `end - months` up to the day before `end`, ascending.
pub fn backfill_dates(end: NaiveDate, months: u32) -> Vec<NaiveDate> {
    let Some(start) = end.checked_sub_months(Months::new(months)) else {
        return Vec::new();
    };
    start.iter_days().take_while(|d| *d < end).collect()
}

pub struct HistoryBackfill<'a> {
    pub source: &'a dyn JsonSource,
    pub store: &'a OutputStore,
    pub pacer: Pacer,
    pub months: u32,
    pub limit: usize,
}

#[derive(Debug, Default)]
struct Tally {
    fetched: usize,
    skipped: usize,
    empty: usize,
    failed: usize,
}

impl HistoryBackfill<'_> {
    /// Runs the backfill ending at `data_date`, asking upstream for the
    /// latest date when none is known. Returns the index of every date with
    /// an archive on disk.
    pub async fn run(&self, data_date: Option<&str>) -> anyhow::Result<HistoricalIndex> {
        let Some(end) = self.resolve_end(data_date).await else {
            tracing::warn!("latest data date unavailable; skipping history backfill");
            return Ok(HistoricalIndex::new(Vec::new(), Utc::now().to_rfc3339()));
        };

        let dates = backfill_dates(end, self.months);
        tracing::info!(
            latest = %end,
            to_fetch = dates.len(),
            months = self.months,
            "history backfill started"
        );

        let mut available = Vec::new();
        let mut tally = Tally::default();
        let total = dates.len();

        for (idx, date) in dates.iter().enumerate() {
            let day = date.format(DATE_FORMAT).to_string();
            let rel = archive_file(&day);

            if tokio::fs::try_exists(self.store.path(&rel)).await? {
                tracing::debug!(processed = idx + 1, total, date = %day, "archive exists; skipping");
                available.push(day);
                tally.skipped += 1;
                continue;
            }

            let body = self
                .source
                .fetch_json(
                    STOCK_LIST_PATH,
                    &[("limit", self.limit.to_string()), ("date", day.clone())],
                )
                .await
                .into_option();

            match body {
                Some(body) => {
                    let stocks = match body.get("stocks") {
                        Some(Value::Array(stocks)) => stocks.clone(),
                        _ => Vec::new(),
                    };
                    if stocks.is_empty() {
                        tracing::warn!(date = %day, "no stocks for date; not writing an archive");
                        tally.empty += 1;
                    } else {
                        let archive = StockListArchive {
                            date: day.clone(),
                            last_updated: Utc::now().to_rfc3339(),
                            total_count: stocks.len() as u64,
                            stocks,
                        };
                        self.store.write_json(&rel, &archive).await?;
                        tracing::debug!(processed = idx + 1, total, date = %day, stocks = archive.total_count, "archived stock list");
                        available.push(day);
                        tally.fetched += 1;
                    }
                }
                None => {
                    tracing::warn!(date = %day, "stock list for date unavailable");
                    tally.failed += 1;
                }
            }

            self.pacer.pace().await;
        }

        // The data date's own archive is written by stage 1.
        let latest = end.format(DATE_FORMAT).to_string();
        if tokio::fs::try_exists(self.store.path(&archive_file(&latest))).await? {
            available.push(latest);
        }

        tracing::info!(
            fetched = tally.fetched,
            skipped = tally.skipped,
            empty = tally.empty,
            failed = tally.failed,
            total,
            "history backfill completed"
        );

        Ok(HistoricalIndex::new(available, Utc::now().to_rfc3339()))
    }

    async fn resolve_end(&self, data_date: Option<&str>) -> Option<NaiveDate> {
        if let Some(date) = data_date.and_then(parse_data_date) {
            return Some(date);
        }
        let body = self
            .source
            .fetch_json(LATEST_DATE_PATH, &[])
            .await
            .into_option()?;
        body.get("latestDate")
            .and_then(Value::as_str)
            .and_then(parse_data_date)
    }
}
