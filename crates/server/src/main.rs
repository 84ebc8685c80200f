use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ddalkkak_core::pipeline::schedule::run_scheduled;
use ddalkkak_core::pipeline::{Pipeline, RefreshScheduler};

mod app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = ddalkkak_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let build_dir = match settings.require_build_dir() {
        Ok(dir) => dir.to_path_buf(),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "cannot serve without a built bundle");
            return Err(e);
        }
    };

    let pipeline = Arc::new(Pipeline::from_settings(&settings)?);

    let scheduler = if settings.scheduler_enabled {
        Some(RefreshScheduler::start(Arc::clone(&pipeline), &settings.fetch_cron).await?)
    } else {
        tracing::info!("data refresh scheduler disabled");
        None
    };

    if settings.fetch_on_start {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            run_scheduled(&pipeline).await;
        });
    }

    let state = app::AppState::new(settings.app_env.clone(), pipeline.lock().clone());
    let router = app::router(state, &build_dir);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(
        %addr,
        environment = %settings.app_env,
        build_dir = %build_dir.display(),
        data_dir = %settings.data_dir.display(),
        "server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "scheduler shutdown failed");
        }
    }
    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("SIGINT received; shutting down"),
        _ = terminate => tracing::info!("SIGTERM received; shutting down"),
    }
}

fn init_sentry(settings: &ddalkkak_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(settings.app_env.clone().into()),
            ..Default::default()
        },
    )))
}
