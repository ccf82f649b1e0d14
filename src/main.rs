use actix_multipart::form::MultipartFormConfig;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use pneumoscan::model::ModelProvider;
use pneumoscan::server::routes;
use pneumoscan::settings::Settings;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::load().context("failed to load configuration")?;
    let source = settings.model.source().context("invalid model source")?;

    info!(
        host = %settings.server.host,
        port = settings.server.port,
        source = ?source,
        "starting pneumoscan"
    );

    let provider = web::Data::new(ModelProvider::new(
        source,
        settings.model.cache_dir.clone(),
    ));
    let upload_limit = settings.limits.max_upload_bytes;
    let bind = (settings.server.host.clone(), settings.server.port);
    let settings = web::Data::new(settings);

    HttpServer::new(move || {
        App::new()
            .app_data(settings.clone())
            .app_data(provider.clone())
            .app_data(
                MultipartFormConfig::default()
                    .total_limit(upload_limit)
                    .memory_limit(upload_limit),
            )
            .wrap(middleware::Logger::default())
            .service(routes::index)
            .service(routes::health)
            .service(routes::predict)
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
