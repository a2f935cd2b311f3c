use anyhow::Result;
use axum::Router;
use bess_edge_dispatch::{api, config::Config, controller, telemetry};
use telemetry::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;
    let app_state = controller::AppState::new(cfg.clone())?;

    let app: Router = api::router(app_state, &cfg);
    let addr = cfg.server.socket_addr()?;

    info!(%addr, node = %cfg.site.node, "starting BESS edge dispatch service");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}
