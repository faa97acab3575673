mod classifier;
mod config;
mod error;
mod handlers;
mod models;
mod store;
mod upload;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::{Config, CONFIG_PATH};
use crate::handlers::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;

    let config = Config::load(CONFIG_PATH)?;

    std::fs::create_dir_all(&config.upload_dir).with_context(|| {
        format!(
            "could not create upload directory {}",
            config.upload_dir.display()
        )
    })?;

    let classifier = classifier::load(&config.model).context("could not load model")?;
    let store = store::connect(&config.store)
        .await
        .context("could not set up result store")?;

    let state = web::Data::new(AppState {
        classifier,
        store,
        upload_dir: config.upload_dir.clone(),
        inference_timeout: config.model.inference_timeout(),
        store_timeout: config.store.timeout(),
    });

    info!("Server running at http://{}", config.bind_address);

    let upload_dir = config.upload_dir.clone();
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(|cfg| handlers::routes(cfg, &upload_dir))
    })
    .bind(&config.bind_address)?
    .run()
    .await?;

    Ok(())
}
