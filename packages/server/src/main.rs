use std::net::SocketAddr;

use tracing::{Level, info};

use lms_server::config::AppConfig;
use lms_server::rbac::RoleSync;
use lms_server::state::AppState;
use lms_server::{database, seed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::load()?;
    let db = database::init_db(&config.database.url).await?;
    seed::seed_capabilities(&db).await?;
    seed::ensure_indexes(&db).await?;

    if config.rbac.sync_on_startup {
        let report = RoleSync::new(&db).sync_roles().await?;
        info!(
            "Synchronized built-in roles, reconciled {}/{} users",
            report.users_updated, report.users_total
        );
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = lms_server::build_router(AppState { db, config });

    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
