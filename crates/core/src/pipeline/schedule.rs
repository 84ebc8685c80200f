use crate::pipeline::error::PipelineError;
use crate::pipeline::orchestrator::Pipeline;
use crate::time::kst;
use chrono::Utc;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

/// Cron-driven data refresh hosted inside a long-running process.
///
/// The cron expression has six fields (seconds first) and is evaluated in
/// KST. Overlapping triggers are rejected by the pipeline's run lock.
pub struct RefreshScheduler {
    inner: JobScheduler,
}

impl RefreshScheduler {
    pub async fn start(pipeline: Arc<Pipeline>, cron: &str) -> anyhow::Result<Self> {
        let inner = JobScheduler::new()
            .await
            .map_err(|e| anyhow::anyhow!("failed to create job scheduler: {e:?}"))?;

        let job = Job::new_async_tz(cron, kst::kst()?, move |_uuid, _l| {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move {
                run_scheduled(&pipeline).await;
            })
        })
        .map_err(|e| anyhow::anyhow!("invalid cron expression {cron:?}: {e:?}"))?;

        inner
            .add(job)
            .await
            .map_err(|e| anyhow::anyhow!("failed to register data refresh job: {e:?}"))?;
        inner
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start job scheduler: {e:?}"))?;

        tracing::info!(cron, timezone = "KST", "scheduled daily data refresh");

        Ok(Self { inner })
    }

    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| anyhow::anyhow!("failed to stop job scheduler: {e:?}"))?;
        tracing::info!("scheduled tasks stopped");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledOutcome {
    Completed,
    Skipped,
    Failed,
}

/// One triggered run. Errors are logged and reported, never propagated: a
/// failed refresh must not take the hosting process down.
pub async fn run_scheduled(pipeline: &Pipeline) -> ScheduledOutcome {
    let now = kst::format_kst(Utc::now()).unwrap_or_else(|_| Utc::now().to_rfc3339());
    tracing::info!(started_at = %now, "scheduled data fetch started");

    match pipeline.run().await {
        Ok(report) => {
            tracing::info!(
                run_id = %report.run_id,
                succeeded = report.stats.succeeded,
                failed = report.stats.failures(),
                duration = %report.metadata.duration,
                "scheduled data fetch completed"
            );
            ScheduledOutcome::Completed
        }
        Err(err) if matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::AlreadyRunning)) => {
            tracing::warn!("previous data fetch still running; skipping this trigger");
            ScheduledOutcome::Skipped
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "scheduled data fetch failed");
            ScheduledOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, FetchOutcome, JsonSource};
    use crate::pipeline::orchestrator::PipelineOptions;
    use crate::storage::OutputStore;

    struct DownSource;

    #[async_trait::async_trait]
    impl JsonSource for DownSource {
        fn base_url(&self) -> &str {
            "memory://down"
        }

        async fn fetch_json(&self, path: &str, _query: &[(&str, String)]) -> FetchOutcome {
            FetchOutcome::Failed(FetchError::Network {
                path: path.to_string(),
                detail: "connection refused".to_string(),
            })
        }
    }

    fn pipeline(dir: &std::path::Path) -> Pipeline {
        Pipeline::new(
            Arc::new(DownSource),
            OutputStore::new(dir),
            PipelineOptions::default(),
        )
    }

    #[tokio::test]
    async fn failed_run_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        assert_eq!(run_scheduled(&p).await, ScheduledOutcome::Failed);
        assert!(!p.lock().is_running());
    }

    #[tokio::test]
    async fn trigger_is_skipped_while_a_run_holds_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        let _permit = p.lock().try_acquire().unwrap();

        assert_eq!(run_scheduled(&p).await, ScheduledOutcome::Skipped);
    }

    #[tokio::test]
    async fn rejects_malformed_cron() {
        let dir = tempfile::tempdir().unwrap();
        let p = Arc::new(pipeline(dir.path()));
        assert!(RefreshScheduler::start(p, "not a cron").await.is_err());
    }
}
