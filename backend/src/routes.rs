use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Write;

use crate::classifier::SpeciesClassifier;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
struct ClassifyUrlRequest {
    url: String,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/api/classify").route(web::post().to(classify_upload)))
        .service(web::resource("/api/classify/url").route(web::post().to(classify_url)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

async fn classify_upload(
    classifier: web::Data<SpeciesClassifier>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let mut images: Vec<Vec<u8>> = Vec::new();

    while let Ok(Some(mut field)) = payload.try_next().await {
        let mut image_data = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk?;
            image_data.write_all(&data)?;
        }
        if !image_data.is_empty() {
            images.push(image_data);
        }
    }

    if images.is_empty() {
        return Ok(HttpResponse::BadRequest().json(ErrorResponse {
            error: "no image file provided".into(),
        }));
    }

    let mut results = Vec::new();
    for image_data in &images {
        info!("Classifying uploaded image ({} bytes)", image_data.len());
        match classifier.classify(image_data).await {
            Ok(result) => results.push(json!({ "result": result })),
            Err(e) => {
                error!("Classification failed: {}", e);
                results.push(json!({ "error": e.to_string() }));
            }
        }
    }

    Ok(HttpResponse::Ok().json(json!({ "results": results })))
}

async fn classify_url(
    classifier: web::Data<SpeciesClassifier>,
    request: web::Json<ClassifyUrlRequest>,
) -> HttpResponse {
    if url::Url::parse(&request.url).is_err() {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "invalid image url".into(),
        });
    }

    match classifier.classify_from_url(&request.url).await {
        Ok(result) => HttpResponse::Ok().json(json!({ "result": result })),
        Err(e) => {
            error!("Classification failed: {}", e);
            HttpResponse::BadRequest().json(ErrorResponse {
                error: e.to_string(),
            })
        }
    }
}
