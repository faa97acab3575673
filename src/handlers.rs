use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use actix_files::Files;
use actix_multipart::{Multipart, MultipartError};
use actix_web::{http::header::ContentType, web, HttpResponse, ResponseError};
use futures_util::StreamExt;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::classifier::Classifier;
use crate::error::ApiError;
use crate::models::PredictionRecord;
use crate::store::ResultStore;
use crate::upload::{sanitize_filename, save_field};

const INDEX_HTML: &str = include_str!("index.html");

/// Dependencies shared by every worker.
pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
    pub store: Arc<dyn ResultStore>,
    pub upload_dir: PathBuf,
    pub inference_timeout: Duration,
    pub store_timeout: Duration,
}

pub fn routes(cfg: &mut web::ServiceConfig, upload_dir: &Path) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/predict").route(web::post().to(predict)))
        .service(Files::new("/static/uploads", upload_dir));
}

pub async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(INDEX_HTML)
}

pub async fn predict(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let result = handle_predict(&state, payload)
        .instrument(info_span!("predict", %request_id))
        .await;

    match result {
        Ok(record) => Ok(HttpResponse::Ok().json(record)),
        Err(e) => {
            if e.status_code().is_server_error() {
                error!(%request_id, "prediction failed: {}", e);
            }
            Err(e)
        }
    }
}

async fn handle_predict(
    state: &AppState,
    mut payload: Multipart,
) -> Result<PredictionRecord, ApiError> {
    // the first part named `file` that carries a filename is the upload
    let saved = loop {
        let mut field = match payload.next().await {
            Some(Ok(field)) => field,
            Some(Err(MultipartError::NoContentType))
            | Some(Err(MultipartError::ParseContentType))
            | Some(Err(MultipartError::Boundary))
            | None => return Err(ApiError::NoFile),
            Some(Err(e)) => return Err(ApiError::Multipart(e.to_string())),
        };

        let disposition = field.content_disposition();
        let is_file_field = disposition.get_name() == Some("file");
        let raw_name = match disposition.get_filename().map(str::to_string) {
            Some(filename) if is_file_field => filename,
            _ => {
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| ApiError::Multipart(e.to_string()))?;
                }
                continue;
            }
        };

        if raw_name.is_empty() {
            return Err(ApiError::EmptyFileName);
        }
        let filename = sanitize_filename(&raw_name).ok_or(ApiError::InvalidFileName)?;
        let path = save_field(&state.upload_dir, &filename, &mut field).await?;
        info!(%filename, "upload saved");
        break (filename, path);
    };
    let (filename, path) = saved;

    let classifier = Arc::clone(&state.classifier);
    let prediction = actix_rt::time::timeout(
        state.inference_timeout,
        web::block(move || classifier.classify_file(&path)),
    )
    .await
    .map_err(|_| ApiError::Timeout("Inference"))???;

    let record = PredictionRecord::now(filename, prediction.label, prediction.confidence());

    actix_rt::time::timeout(state.store_timeout, state.store.insert(&record))
        .await
        .map_err(|_| ApiError::Timeout("Storing the prediction"))??;

    info!(
        filename = %record.filename,
        prediction = %record.prediction,
        confidence = record.confidence,
        "prediction stored"
    );
    Ok(record)
}
