use actix_multipart::form::bytes::Bytes;
use actix_multipart::form::MultipartForm;
use serde::Serialize;

use crate::pipeline::Diagnosis;

/// The multipart body of a prediction request.
#[derive(Debug, MultipartForm)]
pub struct PredictForm {
    #[multipart(rename = "file")]
    pub file: Bytes,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub diagnosis: Diagnosis,
    pub confidence: f64,
    pub raw_score: f64,
    pub threshold: f64,
    /// Base64 PNG of the input tinted with the diagnosis color.
    pub processed_image: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
