use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use std::time::Duration;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod services;
mod utils;

use crate::auth::permissions::{PermissionCache, seed_default_permissions, warmup_permission_cache};
use crate::docs::ApiDoc;
use crate::services::recycle_bin::run_purge_loop;
use crate::utils::cipher::SalaryCipher;
use config::Config;
use db::init_db;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url).await?;
    let cipher = SalaryCipher::from_secret(&config.salary_encryption_key)
        .context("SALARY_ENCRYPTION_KEY is not a valid key")?;
    let permissions = PermissionCache::new(Duration::from_secs(config.permission_cache_ttl_secs));

    seed_default_permissions(&pool).await?;
    if let Err(e) = warmup_permission_cache(&pool, &permissions).await {
        warn!(error = %e, "Permission cache warmup failed; roles load on first use");
    }

    actix_web::rt::spawn(run_purge_loop(
        pool.clone(),
        config.recycle_bin_retention_days,
        Duration::from_secs(config.purge_interval_secs),
    ));

    let server_addr = config.server_addr.clone();
    let pool = Data::new(pool);
    let cipher = Data::new(cipher);
    let permissions = Data::new(permissions);

    HttpServer::new(move || {
        let routes_config = config.clone();
        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                // wildcard {_:.*} so the UI's JS/CSS assets resolve
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(pool.clone())
            .app_data(Data::new(config.clone()))
            .app_data(cipher.clone())
            .app_data(permissions.clone())
            .configure(move |cfg| routes::configure(cfg, routes_config))
    })
    .bind(&server_addr)?
    .run()
    .await?;

    Ok(())
}
