use anyhow::{Context, Result};
use open_energy_aggregator::{api, config::Config, repo, state::AppState, telemetry};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cfg = Config::load().context("loading configuration")?;

    let repo = repo::connect(&cfg.storage)
        .await
        .context("opening storage")?;
    let state = AppState::new(cfg.clone(), repo).context("configuring engine")?;
    let app = api::router(state, &cfg);

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("binding to 0.0.0.0, the service is reachable from the network");
    }
    info!(%addr, backend = ?cfg.storage.backend, "starting open energy aggregator");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
