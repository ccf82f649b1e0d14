//! The user-facing JSON web server that listens for prediction requests.
//! One request is one forward pass: authorize, decode the upload, score it,
//! tint the image, respond.

use actix_multipart::form::MultipartForm;
use actix_web::http::header::ContentType;
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use tracing::{error, info};

use super::protocol::{HealthResponse, PredictForm, PredictResponse};
use super::ApiError;
use crate::model::ModelProvider;
use crate::overlay::overlay_png_b64;
use crate::pipeline::{classify, preprocess};
use crate::settings::Settings;

type Result<T> = std::result::Result<T, ApiError>;

const API_KEY_HEADER: &str = "x-api-key";

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().content_type(ContentType::html()).body(
        "<h1>Pneumonia Detection API &ndash; running</h1>\
         <p>POST an X-ray to <code>/predict</code>.</p>",
    )
}

#[get("/health")]
pub async fn health() -> impl Responder {
    web::Json(HealthResponse { ok: true })
}

/// Reject the request when a key is configured and the header doesn't match.
/// No key configured means the check is disabled.
fn ensure_auth(req: &HttpRequest, expected: Option<&str>) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if provided != Some(expected) {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

#[post("/predict")]
pub async fn predict(
    req: HttpRequest,
    form: MultipartForm<PredictForm>,
    settings: web::Data<Settings>,
    provider: web::Data<ModelProvider>,
) -> Result<impl Responder> {
    ensure_auth(&req, settings.auth.api_key.as_deref())?;

    let img = image::load_from_memory(&form.file.data)
        .map_err(|e| ApiError::BadImage(e.to_string()))?;

    let predictor = provider.get().await?;

    let threshold = settings.model.threshold;
    let input = preprocess(&img, settings.model.image_size);
    // The forward pass is blocking and has no timeout; keep it off the
    // async executor.
    let prediction = web::block(move || classify(predictor.as_ref(), &input, threshold))
        .await
        .map_err(|e| {
            error!("inference task failed: {e}");
            ApiError::Internal
        })??;

    let processed_image = overlay_png_b64(&img, prediction.diagnosis).map_err(|e| {
        error!("overlay encoding failed: {e}");
        ApiError::Internal
    })?;

    info!(
        diagnosis = ?prediction.diagnosis,
        raw_score = prediction.raw_score,
        "served prediction"
    );

    Ok(web::Json(PredictResponse {
        diagnosis: prediction.diagnosis,
        confidence: prediction.confidence,
        raw_score: prediction.raw_score,
        threshold,
        processed_image,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn auth_is_disabled_when_no_key_configured() {
        let req = TestRequest::default().to_http_request();
        assert!(ensure_auth(&req, None).is_ok());

        let req = TestRequest::default()
            .insert_header((API_KEY_HEADER, "anything"))
            .to_http_request();
        assert!(ensure_auth(&req, None).is_ok());
    }

    #[test]
    fn auth_requires_exact_key_match() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            ensure_auth(&req, Some("sekrit")),
            Err(ApiError::Unauthorized)
        ));

        let req = TestRequest::default()
            .insert_header((API_KEY_HEADER, "wrong"))
            .to_http_request();
        assert!(matches!(
            ensure_auth(&req, Some("sekrit")),
            Err(ApiError::Unauthorized)
        ));

        let req = TestRequest::default()
            .insert_header((API_KEY_HEADER, "sekrit"))
            .to_http_request();
        assert!(ensure_auth(&req, Some("sekrit")).is_ok());
    }
}
