//! Offline repair tool for the group reachable cache.
//!
//! The cache table is fully derived from `group_relations`; this tool
//! truncates and regenerates it in one transaction. Use it after manual
//! schema surgery or to verify a suspect cache.
//!
//! Configuration comes from the `IDHUB_*` environment variables (see
//! [`idhub::Config`]).

use idhub::model::groups;
use idhub::{Config, Model};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("idhub rebuild-cache v{}", idhub::VERSION);

    let config = Config::from_env();
    let model = Model::connect(&config).await?;
    model.run_migrations().await?;

    model
        .with_transaction(&[groups::REACHABLE_CACHE_TABLE], &[], |tr| {
            Box::pin(async move { groups::rebuild_reachable_cache(tr).await })
        })
        .await?;

    info!("group reachable cache rebuilt");
    Ok(())
}
