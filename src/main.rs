use anyhow::Result;
use mcpanel::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let state = bootstrap::build_state(&app_config).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let worker_handle = worker::spawn(
        worker::WorkerDeps {
            registry: state.registry.clone(),
            supervisor: state.supervisor.clone(),
            broadcaster: state.broadcaster.clone(),
            servers: state.servers.clone(),
            auth: state.auth.clone(),
            stats: state.stats.clone(),
            shutdown_rx,
        },
        worker::WorkerConfig::from_config(&app_config),
    );

    let armed = state.backups.start_schedulers().await?;
    tracing::info!(schedules = armed, "backup schedules armed");
    if app_config.supervisor.auto_start {
        state.supervisor.auto_start().await;
    }

    let supervisor = state.supervisor.clone();
    let backups = state.backups.clone();
    let app = routes::app(state);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let served = tokio::select! {
        result = axum::serve(listener, app) => result,
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
            Ok(())
        }
    };

    backups.shutdown();
    supervisor.stop_all().await;
    let _ = shutdown_tx.send(());
    let _ = worker_handle.await;
    tracing::info!("shutdown complete");
    served?;
    Ok(())
}
