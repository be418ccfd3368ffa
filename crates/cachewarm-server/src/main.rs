mod api;
mod middleware;
mod scheduler;

use std::{net::SocketAddr, sync::Arc};

use cachewarm_runner::Runner;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    middleware::DebugAccess,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = cachewarm_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let runner = Arc::new(Runner::from_config(&config)?);

    let _scheduler = match config.cron.as_deref() {
        Some(cron) => {
            tracing::info!(cron, "scheduling warm runs");
            Some(scheduler::build_scheduler(Arc::clone(&runner), cron).await?)
        }
        None => None,
    };

    let app = build_app(AppState {
        runner,
        debug: DebugAccess::from_config(&config),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, jobs = %config.jobs_file.display(), "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
