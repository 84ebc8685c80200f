use crate::domain::recommendation::RecommendationMaps;
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const UNDERVALUED_STOCKS_FILE: &str = "undervalued-stocks.json";
pub const UNDERVALUED_STOCKS_ARCHIVE_DIR: &str = "undervalued-stocks";
pub const FEATURED_STOCKS_FILE: &str = "featured-stocks.json";
pub const FILINGS_FILE: &str = "filings.json";
pub const BACKTEST_PERFORMANCE_FILE: &str = "backtest-performance.json";
pub const ETFS_FILE: &str = "etfs.json";
pub const ETFS_DETAILED_FILE: &str = "etfs-detailed.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const RECOMMENDATIONS_DIR: &str = "recommendations";
pub const SUMMARY_FILE: &str = "recommendations/summary.json";
pub const PRICE_GUIDANCE_FILE: &str = "recommendations/price-guidance.json";
pub const INVESTMENT_RATING_FILE: &str = "recommendations/investment-rating.json";

/// Relative path of the stock-list archive for one `YYYY-MM-DD` date.
pub fn archive_file(date: &str) -> String {
    format!("{UNDERVALUED_STOCKS_ARCHIVE_DIR}/{date}.json")
}

/// Directory of static JSON documents consumed by the frontend.
///
/// Every write goes to a temporary sibling first and is renamed into place, so
/// readers never observe a half-written document.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub async fn write_json<T: Serialize + ?Sized>(
        &self,
        rel: &str,
        value: &T,
    ) -> anyhow::Result<PathBuf> {
        let path = self.path(rel);
        let bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("failed to serialize {rel}"))?;
        write_atomic(&path, &bytes).await?;
        Ok(path)
    }

    /// Writes a complete snapshot of all three recommendation mappings.
    pub async fn flush_recommendations(&self, maps: &RecommendationMaps) -> anyhow::Result<()> {
        for (rel, map) in [
            (SUMMARY_FILE, &maps.summary),
            (PRICE_GUIDANCE_FILE, &maps.price_guidance),
            (INVESTMENT_RATING_FILE, &maps.investment_rating),
        ] {
            let path = self.write_json(rel, map).await?;
            tracing::info!(path = %path.display(), stocks = map.len(), "saved recommendation snapshot");
        }
        Ok(())
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("output path has no parent: {}", path.display()))?;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create dir {}", dir.display()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("invalid output file name: {}", path.display()))?;
    let tmp = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;

    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err).with_context(|| format!("failed to move {} into place", path.display()));
    }

    Ok(())
}
