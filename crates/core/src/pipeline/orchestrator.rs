use crate::collect::RecommendationCollector;
use crate::config::Settings;
use crate::domain::metadata::{
    format_duration, MetadataSources, RunMetadata, SourceStats, SOURCE_BACKTEST_PERFORMANCE,
    SOURCE_ETFS, SOURCE_RECOMMENDATIONS, SOURCE_UNDERVALUED_STOCKS,
};
use crate::domain::recommendation::{CollectionStatus, RecommendationMaps, RunStats};
use crate::domain::stock::{MarketType, StockListArchive, StockListResponse};
use crate::fetch::{FetchOutcome, HttpJsonSource, JsonSource, Pacer};
use crate::pipeline::error::PipelineError;
use crate::pipeline::lock::RunLock;
use crate::pipeline::history::HistoryBackfill;
use crate::pipeline::sources;
use crate::storage::json_store::{archive_file, METADATA_FILE, UNDERVALUED_STOCKS_FILE};
use crate::storage::OutputStore;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const STOCK_LIST_PATH: &str = "/api/undervalued-stocks/export";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub stock_list_limit: usize,
    /// Flush the recommendation mappings after every N processed tickers.
    pub flush_every: usize,
    pub pace: Duration,
    /// Only stocks of this market go through per-ticker collection.
    pub market: MarketType,
    pub featured_limit: usize,
    pub filings_limit: usize,
    pub backtest_profiles: Vec<String>,
    pub backtest_years: u32,
    /// Delay between ETF detail fetches.
    pub etf_pace: Duration,
    /// Months of dated archives to backfill; 0 skips the backfill.
    pub history_months: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            stock_list_limit: 1000,
            flush_every: 10,
            pace: Duration::from_millis(100),
            market: MarketType::Us,
            featured_limit: 10,
            filings_limit: 20,
            backtest_profiles: sources::DEFAULT_BACKTEST_PROFILES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            backtest_years: 3,
            etf_pace: Duration::from_millis(50),
            history_months: 12,
        }
    }
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            stock_list_limit: settings.stock_list_limit,
            flush_every: settings.flush_every.max(1),
            pace: settings.pace,
            history_months: settings.history_months,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub stats: RunStats,
    /// Number of recommendation flushes, the final one included.
    pub flushes: usize,
    pub metadata: RunMetadata,
}

/// Two-stage collection run: stock list, then per-ticker recommendations.
///
/// Only one run executes at a time per `Pipeline` (and per shared `RunLock`);
/// a concurrent call fails fast with `PipelineError::AlreadyRunning`.
pub struct Pipeline {
    source: Arc<dyn JsonSource>,
    store: OutputStore,
    opts: PipelineOptions,
    lock: RunLock,
}

impl Pipeline {
    pub fn new(source: Arc<dyn JsonSource>, store: OutputStore, opts: PipelineOptions) -> Self {
        Self {
            source,
            store,
            opts,
            lock: RunLock::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let source = HttpJsonSource::from_settings(settings)?;
        let store = OutputStore::new(settings.require_data_dir()?);
        Ok(Self::new(
            Arc::new(source),
            store,
            PipelineOptions::from_settings(settings),
        ))
    }

    pub fn with_lock(mut self, lock: RunLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn lock(&self) -> &RunLock {
        &self.lock
    }

    pub async fn run(&self) -> anyhow::Result<RunReport> {
        let Some(_permit) = self.lock.try_acquire() else {
            return Err(PipelineError::AlreadyRunning.into());
        };

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let started_at = Utc::now();
        tracing::info!(
            %run_id,
            base_url = self.source.base_url(),
            out_dir = %self.store.root().display(),
            "data collection started"
        );

        // Stage 1: nothing is written unless the stock list is usable.
        let (raw, list) = self.fetch_stock_list().await?;

        let mut metadata = RunMetadata {
            last_updated: started_at,
            data_date: list.data_date.clone(),
            sources: MetadataSources::default(),
            duration: String::new(),
        };

        self.save_stock_list(&raw, &list).await?;
        metadata.sources.insert(
            SOURCE_UNDERVALUED_STOCKS.to_string(),
            SourceStats::new(
                list.count(),
                list.last_updated
                    .clone()
                    .unwrap_or_else(|| Utc::now().to_rfc3339()),
            ),
        );

        self.collect_auxiliary(&mut metadata).await?;

        // Stage 2.
        let tickers: Vec<String> = list
            .filter_market(&self.opts.market)
            .into_iter()
            .map(|s| s.ticker)
            .collect();
        tracing::info!(
            %run_id,
            market = %self.opts.market,
            listed = list.stocks.as_ref().map_or(0, |s| s.len()),
            selected = tickers.len(),
            "stock list filtered"
        );

        let (maps, stats, flushes) = self.collect_recommendations(&tickers).await?;

        metadata.sources.insert(
            SOURCE_RECOMMENDATIONS.to_string(),
            SourceStats {
                failed: Some(stats.failures() as u64),
                partial: Some(stats.partial as u64),
                total: Some(stats.total as u64),
                ..SourceStats::new(stats.succeeded as u64, Utc::now().to_rfc3339())
            },
        );
        metadata.duration = format_duration(started.elapsed());
        self.store.write_json(METADATA_FILE, &metadata).await?;

        tracing::info!(
            %run_id,
            succeeded = stats.succeeded,
            failed = stats.failures(),
            total = stats.total,
            summary = maps.summary.len(),
            price_guidance = maps.price_guidance.len(),
            investment_rating = maps.investment_rating.len(),
            duration = %metadata.duration,
            data_date = metadata.data_date.as_deref().unwrap_or("N/A"),
            "data collection completed"
        );

        Ok(RunReport {
            run_id,
            stats,
            flushes,
            metadata,
        })
    }

    async fn fetch_stock_list(&self) -> Result<(Value, StockListResponse), PipelineError> {
        let outcome = self
            .source
            .fetch_json(
                STOCK_LIST_PATH,
                &[("limit", self.opts.stock_list_limit.to_string())],
            )
            .await;

        let raw = match outcome {
            FetchOutcome::Found(v) => v,
            FetchOutcome::NotFound => {
                return Err(PipelineError::StockListUnavailable {
                    reason: "upstream returned 404".to_string(),
                })
            }
            FetchOutcome::Failed(err) => {
                return Err(PipelineError::StockListUnavailable {
                    reason: err.to_string(),
                })
            }
        };

        let list = serde_json::from_value::<StockListResponse>(raw.clone()).map_err(|err| {
            PipelineError::StockListUnavailable {
                reason: format!("unexpected response shape: {err}"),
            }
        })?;

        if list.is_empty() {
            return Err(PipelineError::StockListUnavailable {
                reason: "response contains no stocks".to_string(),
            });
        }

        Ok((raw, list))
    }

    async fn save_stock_list(&self, raw: &Value, list: &StockListResponse) -> anyhow::Result<()> {
        let path = self.store.write_json(UNDERVALUED_STOCKS_FILE, raw).await?;
        tracing::info!(
            path = %path.display(),
            stocks = list.stocks.as_ref().map_or(0, |s| s.len()),
            "saved stock list"
        );

        let Some(date) = list.data_date.as_deref() else {
            return Ok(());
        };
        if !is_safe_file_stem(date) {
            tracing::warn!(data_date = date, "data date is not usable as a file name; skipping archive");
            return Ok(());
        }

        let archive = StockListArchive {
            date: date.to_string(),
            last_updated: Utc::now().to_rfc3339(),
            total_count: list.count(),
            stocks: list.stocks.clone().unwrap_or_default(),
        };
        self.store.write_json(&archive_file(date), &archive).await?;
        tracing::debug!(data_date = date, "archived stock list");
        Ok(())
    }

    async fn collect_auxiliary(&self, metadata: &mut RunMetadata) -> anyhow::Result<()> {
        let source = self.source.as_ref();
        let pacer = Pacer::new(self.opts.pace);

        for list in [
            sources::featured_stocks(self.opts.featured_limit),
            sources::latest_filings(self.opts.filings_limit),
        ] {
            if let Some(stats) = sources::collect_list(source, &self.store, &list).await? {
                metadata.sources.insert(list.name, stats);
            }
        }

        let etf_pacer = Pacer::new(self.opts.etf_pace);
        if let Some(stats) = sources::collect_etfs(source, &self.store, &etf_pacer).await? {
            metadata.sources.insert(SOURCE_ETFS, stats);
        }

        if self.opts.history_months > 0 {
            let backfill = HistoryBackfill {
                source,
                store: &self.store,
                pacer,
                months: self.opts.history_months,
                limit: self.opts.stock_list_limit,
            };
            let index = backfill.run(metadata.data_date.as_deref()).await?;
            metadata.sources.historical_data = Some(index);
        }

        if !self.opts.backtest_profiles.is_empty() {
            let stats = sources::collect_backtest_performance(
                source,
                &self.store,
                &pacer,
                &self.opts.backtest_profiles,
                self.opts.backtest_years,
            )
            .await?;
            metadata.sources.insert(SOURCE_BACKTEST_PERFORMANCE, stats);
        }

        Ok(())
    }

    async fn collect_recommendations(
        &self,
        tickers: &[String],
    ) -> anyhow::Result<(RecommendationMaps, RunStats, usize)> {
        let collector =
            RecommendationCollector::new(self.source.as_ref(), Pacer::new(self.opts.pace));
        let mut maps = RecommendationMaps::default();
        let mut stats = RunStats::new(tickers.len());
        let mut flushes = 0;
        let total = tickers.len();

        for (idx, ticker) in tickers.iter().enumerate() {
            let n = idx + 1;
            let bundle = collector.collect(ticker).await;
            let status = bundle.status();
            stats.record(status);
            maps.insert(ticker, bundle);

            match status {
                CollectionStatus::Full => {
                    tracing::info!(processed = n, total, %ticker, "all recommendation data collected")
                }
                CollectionStatus::Partial => {
                    tracing::warn!(processed = n, total, %ticker, "partial recommendation data collected")
                }
                CollectionStatus::Failed => {
                    tracing::warn!(processed = n, total, %ticker, "no recommendation data collected")
                }
            }

            if n % self.opts.flush_every == 0 {
                tracing::info!(processed = n, total, "saving intermediate results");
                self.store.flush_recommendations(&maps).await?;
                flushes += 1;
            }
        }

        self.store.flush_recommendations(&maps).await?;
        flushes += 1;

        tracing::info!(
            succeeded = stats.succeeded,
            partial = stats.partial,
            failed = stats.failed,
            total,
            "recommendation collection summary"
        );

        Ok((maps, stats, flushes))
    }
}

fn is_safe_file_stem(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('.')
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_date_file_stems() {
        assert!(is_safe_file_stem("2026-01-27"));
        assert!(!is_safe_file_stem("../etc"));
        assert!(!is_safe_file_stem("2026/01/27"));
        assert!(!is_safe_file_stem(""));
    }

    #[test]
    fn options_follow_settings() {
        let settings = Settings {
            flush_every: 0,
            stock_list_limit: 50,
            pace: Duration::from_millis(5),
            ..Settings::default()
        };
        let opts = PipelineOptions::from_settings(&settings);
        assert_eq!(opts.flush_every, 1);
        assert_eq!(opts.stock_list_limit, 50);
        assert_eq!(opts.pace, Duration::from_millis(5));
        assert_eq!(opts.market, MarketType::Us);
        assert_eq!(opts.backtest_profiles.len(), 7);
        assert_eq!(opts.history_months, 12);
        assert_eq!(opts.etf_pace, Duration::from_millis(50));
    }
}
