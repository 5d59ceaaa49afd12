use carebridge_common::connect_to_database;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::infrastructure::AppStateImpl;
use crate::infrastructure::http::{HttpServer, HttpServerConfig};
use crate::infrastructure::jobs::HttpJobInvoker;
use crate::infrastructure::persistence::{
    PostgresInstitutionLinkRepository, PostgresLinkRequestRepository, PostgresPostRepository,
};
use crate::infrastructure::settings::Settings;

mod domain;
mod infrastructure;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database = connect_to_database(&settings.database).await?;
    tracing::info!("connected to database");

    let jobs = HttpJobInvoker::new(&settings.jobs)?;
    let state = AppStateImpl::new(
        PostgresLinkRequestRepository::new(database),
        PostgresInstitutionLinkRepository::new(database),
        jobs,
        PostgresPostRepository::new(database),
        &settings.review,
    );

    let server_config = HttpServerConfig {
        port: &settings.server_port,
    };
    let http_server = HttpServer::new(state, server_config).await?;
    http_server.run().await
}
