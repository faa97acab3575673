use std::io;

use actix_web::{error::BlockingError, http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::models::ErrorResponse;
use crate::store::StoreError;

/// Everything `/predict` can fail with. Always rendered as `{"error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No file uploaded")]
    NoFile,
    #[error("Empty file name")]
    EmptyFileName,
    #[error("Invalid file name")]
    InvalidFileName,
    #[error("Malformed upload: {0}")]
    Multipart(String),
    #[error("Could not save file")]
    Upload(#[from] io::Error),
    #[error("{0}")]
    Classifier(#[from] ClassifierError),
    #[error("Could not store prediction")]
    Store(#[from] StoreError),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("Worker pool unavailable")]
    Blocking(#[from] BlockingError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            // the upload form only ever checks the body
            ApiError::NoFile | ApiError::EmptyFileName | ApiError::InvalidFileName => {
                StatusCode::OK
            }
            ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::Classifier(ClassifierError::Decode(_)) => StatusCode::BAD_REQUEST,
            ApiError::Upload(_) | ApiError::Classifier(_) | ApiError::Blocking(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            ApiError::Classifier(ClassifierError::Decode(_)) => self.to_string(),
            ApiError::Classifier(_) => "Classification failed".to_string(),
            _ => self.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse { error })
    }
}
