use anyhow::Result;
use chrono::Local;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "http-api")]
use seglive::http;
use seglive::metrics::Metrics;
use seglive::{CommandSupervisor, Lifecycle, SessionRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    let config = seglive::config::get_setting();

    let env =
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, config.log_level.clone());
    env_logger::Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.module_path().unwrap_or("<unnamed>"),
                &record.args()
            )
        })
        .init();

    log::info!("Starting seglive");

    let metrics = Arc::new(Metrics::new());
    let registry = Arc::new(SessionRegistry::new());
    let supervisor = Arc::new(CommandSupervisor::new());
    let lifecycle = Arc::new(Lifecycle::from_settings(
        &config,
        Arc::clone(&registry),
        supervisor,
        Arc::clone(&metrics),
    ));

    #[cfg(feature = "http-api")]
    {
        let port = config.http.port;
        let lifecycle_t = Arc::clone(&lifecycle);
        let metrics_t = Arc::clone(&metrics);
        tokio::spawn(async move {
            http::Service::new(lifecycle_t, metrics_t).run(port).await;
        });
    }

    tokio::signal::ctrl_c().await?;
    log::info!("Received shutdown signal, shutting down...");

    registry
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    log::info!("Server shutdown completed");
    Ok(())
}
