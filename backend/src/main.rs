mod classifier;
mod ensemble;
mod enrichment;
mod merge;
mod providers;
mod routes;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use std::env;

use classifier::SpeciesClassifier;
use ensemble::EnsembleRegistry;
use ensemble::config::{self, EnsembleConfig};
use providers::plantnet_service::PlantNetService;
use providers::vision_service::VisionService;
use routes::configure_routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    dotenv::dotenv().ok();

    let ensemble_config = match EnsembleConfig::load() {
        Ok(ensemble_config) => ensemble_config,
        Err(e) => {
            log::error!("Failed to load ensemble manifest: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Ensemble manifest loading failed: {}", e),
            ));
        }
    };

    let vision_key = env::var("GOOGLE_VISION_API_KEY").ok();
    if vision_key.is_none() {
        log::warn!("GOOGLE_VISION_API_KEY is not set; the general vision provider is unavailable");
    }
    let plantnet_key = env::var("PLANTNET_API_KEY").ok();
    if plantnet_key.is_none() {
        log::warn!("PLANTNET_API_KEY is not set; the plant specialist is unavailable");
    }

    let registry = EnsembleRegistry::new(ensemble_config, config::workspace_root());
    let classifier = SpeciesClassifier::new(
        registry,
        PlantNetService::new(plantnet_key),
        VisionService::new(vision_key),
    );

    // Warm the model registry now instead of on the first request; a failed
    // load only logs, since providers still work without the pre-classifier.
    classifier.warm_up().await;
    let classifier = web::Data::new(classifier);

    let port = env::var("PORT").unwrap_or_else(|_| "8081".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(classifier.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
