use std::net::SocketAddr;

use libpostify::logging;
use libpostify::{Config, Database};
use postify_server::{app, AppStateInner};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_default();

    // Read once; handlers share it through the state
    let config = Config::load()?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let db = Database::new(&config.database_path()).await?;
    info!(
        "Database ready at {} (sessions: {:?})",
        config.database_path(),
        config.server.session_backend
    );

    let state = AppStateInner::from_config(config, db)?;
    if !state.config.publish.instagram_enabled {
        info!("Instagram publishing is disabled");
    }

    info!("Postify server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
