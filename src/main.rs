use std::error::Error;

use actix_web::{middleware, web, App, HttpServer};
use student_predictor::api;
use student_predictor::config::Config;
use student_predictor::model::PredictionEngine;
use student_predictor::profiles::ProfileStore;
use student_predictor::store::PredictionStore;

async fn start_api(
    config: &Config,
    engine: PredictionEngine,
    store: PredictionStore,
) -> std::io::Result<()> {
    let engine_data = web::Data::new(engine);
    let store_data = web::Data::new(store);
    let profile_data = web::Data::new(ProfileStore::new());

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(engine_data.clone())
            .app_data(store_data.clone())
            .app_data(profile_data.clone())
            .configure(api::configure)
    })
    .bind(config.bind_address())?
    .run()
    .await
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    log::info!("Loading prediction engine...");
    let engine = PredictionEngine::from_config(&config).await?;
    log::info!(
        "Prediction strategy: {} ({})",
        engine.strategy_name(),
        engine.model_version()
    );

    log::info!(
        "Starting Student Predictor API on http://{}:{}",
        config.host,
        config.port
    );
    start_api(&config, engine, PredictionStore::new()).await?;

    Ok(())
}
