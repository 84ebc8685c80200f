use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ddalkkak_core::pipeline::{Pipeline, PipelineError};

#[derive(Debug, Parser)]
#[command(name = "ddalkkak_worker")]
struct Args {
    /// Upstream API base URL. Overrides EXPO_PUBLIC_API_URL.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Output directory for the JSON documents. Overrides DATA_DIR.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Collect all data once and write the JSON documents (default).
    Fetch,

    /// Copy the data directory into a built web bundle (`<bundle>/data`).
    Publish {
        /// Built bundle directory. Defaults to BUILD_DIR.
        #[arg(long)]
        bundle_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = ddalkkak_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    if let Some(url) = args.api_url {
        settings.api_base_url = url;
    }
    if let Some(dir) = args.data_dir {
        settings.data_dir = dir;
    }

    let res = match args.command.unwrap_or(Command::Fetch) {
        Command::Fetch => fetch(&settings).await,
        Command::Publish { bundle_dir } => {
            let bundle_dir = bundle_dir.unwrap_or_else(|| settings.build_dir.clone());
            ddalkkak_core::storage::publish::publish_data(&settings.data_dir, &bundle_dir)
                .map(|_| ())
        }
    };

    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
    }
    res
}

async fn fetch(settings: &ddalkkak_core::config::Settings) -> anyhow::Result<()> {
    tracing::info!(
        api_url = %settings.api_base_url,
        data_dir = %settings.data_dir.display(),
        "starting data collection"
    );

    let pipeline = Pipeline::from_settings(settings)?;

    match pipeline.run().await {
        Ok(report) => {
            tracing::info!(
                run_id = %report.run_id,
                succeeded = report.stats.succeeded,
                failed = report.stats.failures(),
                total = report.stats.total,
                duration = %report.metadata.duration,
                "data collection completed"
            );
            Ok(())
        }
        Err(err) => {
            if let Some(PipelineError::StockListUnavailable { reason }) =
                err.downcast_ref::<PipelineError>()
            {
                tracing::error!(%reason, "no stocks found; exiting");
            }
            Err(err).context("data collection failed")
        }
    }
}

fn init_sentry(settings: &ddalkkak_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
