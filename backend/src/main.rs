//! Queue admin entry-point: loads settings, opens the database pool, starts
//! the state-count cache, and serves the API.

use std::sync::Arc;

use color_eyre::eyre::{Result, eyre};
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use queue_admin::config::AdminSettings;
use queue_admin::inbound::http::pipeline::PipelineConfig;
use queue_admin::inbound::http::spa::SpaAssets;
use queue_admin::inbound::http::state::HttpState;
use queue_admin::inbound::http::state_counts::state_counts_cacher;
use queue_admin::outbound::cache::QueryCacherConfig;
use queue_admin::outbound::persistence::{DbPool, PgBackend, PoolConfig};
use queue_admin::server::{ServerConfig, create_server};

#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = AdminSettings::load_from_iter(std::env::args_os())
        .map_err(|e| eyre!("failed to load settings: {e}"))?;

    let pool_config =
        PoolConfig::new(settings.database_url()?).with_max_size(settings.pool_max_size());
    let pool = DbPool::new(pool_config)
        .await
        .map_err(|e| eyre!("failed to build database pool: {e}"))?;
    let backend = Arc::new(PgBackend::new(pool));

    let cacher = Arc::new(state_counts_cacher(
        Arc::clone(&backend),
        QueryCacherConfig::default().with_tick_period(settings.cache_tick_period()),
    ));
    cacher.start(std::future::pending())?;

    let assets = match settings.static_dir() {
        Some(dir) => SpaAssets::open(dir)
            .map_err(|e| eyre!("failed to open static directory {}: {e}", dir.display()))?,
        None => SpaAssets::disabled(),
    };

    let state = HttpState::new(
        backend,
        Arc::clone(&cacher),
        PipelineConfig::default().with_request_timeout(settings.request_timeout()),
    );
    let config = ServerConfig::new(settings.bind_addr()).with_assets(assets);
    info!(bind_addr = %config.bind_addr(), "starting queue admin server");
    let outcome = create_server(state, config)?.await;

    cacher.stop().await;
    outcome.map_err(Into::into)
}
