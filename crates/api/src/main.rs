use std::sync::Arc;

use anyhow::Context;

use crm_api::app::{self, services::AppServices};
use crm_infra::{AppConfig, LogMailer, Repositories};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crm_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let repos = repositories(&config).await?;
    let services = Arc::new(AppServices::from_config(&config, repos, Arc::new(LogMailer)));

    if let Some(admin) = &config.admin {
        services
            .seed_admin(&admin.email, &admin.password)
            .await
            .context("failed to seed the bootstrap admin")?;
    }

    let app = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "postgres")]
async fn repositories(config: &AppConfig) -> anyhow::Result<Repositories> {
    match &config.database_url {
        Some(url) => {
            let repo = crm_infra::repository::postgres::PostgresRepository::connect(url)
                .await
                .context("failed to connect to postgres")?;
            tracing::info!("using postgres storage");
            Ok(Repositories::postgres(repo))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory storage");
            Ok(Repositories::in_memory())
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn repositories(config: &AppConfig) -> anyhow::Result<Repositories> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL ignored: built without the `postgres` feature");
    }
    Ok(Repositories::in_memory())
}
