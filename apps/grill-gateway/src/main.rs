use anyhow::Context;
use grill_gateway::config::AppConfig;
use grill_gateway::routes;
use grill_gateway::state::AppState;
use grill_gateway::telemetry::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cfg = AppConfig::from_env();
    init_tracing(&cfg.log_filter);

    let state = AppState::from_config(&cfg).context("building gateway state")?;
    let _sweeper = state.spawn_sweeper(cfg.session_sweep_interval());
    let app = routes::router(state.clone());

    info!(
        addr = %cfg.bind_addr,
        services = ?state.service_names(),
        auth_bypass = cfg.auth_bypass,
        backend_timeout_ms = cfg.backend_timeout_ms,
        idle_timeout_secs = cfg.session_idle_timeout_secs,
        "starting grill-gateway"
    );
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    axum::serve(listener, app.into_make_service())
        .await
        .context("serving http")?;
    Ok(())
}
