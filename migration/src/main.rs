use crate::{
    domain::{SchemaOptions, migration::Migration, required_tables},
    infrastructure::{persistence::PersistenceAdapter, settings::Settings},
};
use carebridge_common::connect_to_database;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod domain;
pub mod infrastructure;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database = connect_to_database(&settings.database).await?;
    let persistence = PersistenceAdapter::new(database);

    let options = SchemaOptions {
        enforce_unique_active_links: settings.migration.enforce_unique_active_links,
    };
    if !options.enforce_unique_active_links {
        tracing::warn!("active institution links are not unique at storage level");
    }

    let migration = Migration::new(required_tables(options), persistence);
    migration.migrate().await?;
    tracing::info!("schema migrated");

    Ok(())
}
