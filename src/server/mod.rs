//! HTTP error taxonomy and its mapping onto response codes. Authorization
//! and decode failures carry client-facing messages; everything else is an
//! opaque server error.

use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;
use tracing::error;

use crate::model::ModelError;

mod protocol;
pub mod routes;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid or missing API key")]
    Unauthorized,

    #[error("could not decode image: {0}")]
    BadImage(String),

    #[error("model unavailable")]
    ModelUnavailable,

    #[error("internal server error")]
    Internal,
}

impl actix_web::error::ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadImage(_) => StatusCode::BAD_REQUEST,
            ApiError::ModelUnavailable | ApiError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(protocol::ErrorResponse {
                error: self.to_string(),
            })
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> ApiError {
        match err {
            ModelError::Unavailable(_) | ModelError::Io(_) => {
                error!("model load failed: {err}");
                ApiError::ModelUnavailable
            }
            ModelError::Contract(_) | ModelError::Forward(_) => {
                error!("inference failed: {err}");
                ApiError::Internal
            }
        }
    }
}
