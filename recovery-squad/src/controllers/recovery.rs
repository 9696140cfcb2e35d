use actix_multipart::{Multipart, MultipartError};
use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use chrono::Utc;
use futures_util::TryStreamExt;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::agents::{FactoryError, Pipeline, GENERIC_FAILURE_MESSAGE, PERSONAS};
use crate::models::{PersonaSummary, RecoveryResponse};
use crate::staging::{stage_images, UploadedImage};
use crate::AppState;

pub const EMPTY_INPUT_MESSAGE: &str = "Please share your feelings or upload screenshots.";
pub const TEXT_TOO_LONG_MESSAGE: &str =
    "Your message is too long. Please shorten it and try again.";
const UNREADABLE_FORM_MESSAGE: &str = "Could not read the submitted form.";

/// Cap on the `api_key` and `narrative` fields. Image parts use the
/// configured per-file limit instead.
pub const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
enum FormError {
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("field '{0}' is over the text size limit")]
    FieldTooLarge(String),
}

/// Fields collected from the multipart submission
#[derive(Debug, Default)]
struct RecoveryForm {
    api_key: String,
    narrative: String,
    images: Vec<UploadedImage>,
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct PersonasResponse {
    success: bool,
    personas: Vec<PersonaSummary>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/recovery").route(web::post().to(submit_recovery)));
    cfg.service(web::resource("/api/personas").route(web::get().to(list_personas)));
}

async fn list_personas() -> impl Responder {
    HttpResponse::Ok().json(PersonasResponse {
        success: true,
        personas: PERSONAS.iter().map(PersonaSummary::from).collect(),
    })
}

async fn read_form(mut payload: Multipart, max_upload_bytes: usize) -> Result<RecoveryForm, FormError> {
    let mut form = RecoveryForm::default();

    while let Some(mut field) = payload.try_next().await? {
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let filename = disposition.get_filename().map(|f| f.to_string());
        let content_type = field.content_type().map(|m| m.to_string());

        let keep = matches!(name.as_str(), "api_key" | "narrative" | "images");
        let limit = if name == "images" {
            max_upload_bytes
        } else {
            MAX_TEXT_FIELD_BYTES
        };

        // Keep draining an oversized part so the stream stays in sync
        let mut bytes = Vec::new();
        let mut oversized = false;
        while let Some(chunk) = field.try_next().await? {
            if !keep || oversized {
                continue;
            }
            if bytes.len() + chunk.len() > limit {
                oversized = true;
                bytes.clear();
                continue;
            }
            bytes.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "api_key" | "narrative" if oversized => return Err(FormError::FieldTooLarge(name)),
            "api_key" => form.api_key = String::from_utf8_lossy(&bytes).into_owned(),
            "narrative" => form.narrative = String::from_utf8_lossy(&bytes).into_owned(),
            "images" => {
                // Browsers submit an empty, nameless part when no file was picked
                let Some(filename) = filename.filter(|f| !f.trim().is_empty()) else {
                    continue;
                };

                let mut upload = UploadedImage::new(filename, bytes);
                if let Some(ct) = content_type {
                    upload = upload.with_content_type(ct);
                }

                if oversized {
                    log::warn!("[RECOVERY] Skipping oversized upload '{}'", upload.filename);
                    form.warnings.push(format!(
                        "'{}' is over the upload size limit and was skipped.",
                        upload.filename
                    ));
                } else if !upload.has_allowed_extension() {
                    log::warn!("[RECOVERY] Skipping non-image upload '{}'", upload.filename);
                    form.warnings.push(format!(
                        "'{}' is not a JPG or PNG image and was skipped.",
                        upload.filename
                    ));
                } else {
                    form.images.push(upload);
                }
            }
            other => log::debug!("[RECOVERY] Ignoring form field '{}'", other),
        }
    }

    Ok(form)
}

async fn submit_recovery(state: web::Data<AppState>, payload: Multipart) -> HttpResponse {
    let run_id = Uuid::new_v4().to_string();
    let response = RecoveryResponse::new(run_id.clone(), Utc::now());

    let form = match read_form(payload, state.config.max_upload_bytes).await {
        Ok(f) => f,
        Err(e) => {
            log::warn!("[RECOVERY] {} Failed to read form: {}", run_id, e);
            let (status, message) = match e {
                FormError::FieldTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, TEXT_TOO_LONG_MESSAGE),
                FormError::Multipart(_) => (StatusCode::BAD_REQUEST, UNREADABLE_FORM_MESSAGE),
            };
            return HttpResponse::build(status).json(response.failed(message));
        }
    };
    let response = response.with_warnings(form.warnings);

    if form.narrative.trim().is_empty() && form.images.is_empty() {
        log::info!("[RECOVERY] {} Rejected empty submission", run_id);
        return HttpResponse::BadRequest()
            .json(response.with_warnings(vec![EMPTY_INPUT_MESSAGE.to_string()]).rejected());
    }

    let squad = match state.factory.build(&form.api_key) {
        Ok(squad) => squad,
        Err(e) => {
            let status = match e {
                FactoryError::MissingCredential => StatusCode::BAD_REQUEST,
                FactoryError::Initialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            return HttpResponse::build(status).json(response.failed(e.user_message()));
        }
    };
    let response = response.with_warnings(squad.warnings().to_vec());

    let images = stage_images(&state.config.staging_dir, &form.images).await;
    log::info!(
        "[RECOVERY] {} Starting run: narrative {} chars, {}/{} images staged",
        run_id,
        form.narrative.chars().count(),
        images.len(),
        form.images.len()
    );

    let report = Pipeline::new(&squad, run_id.clone(), state.config.max_tool_iterations)
        .run(&form.narrative, &images)
        .await;

    if report.is_complete() {
        HttpResponse::Ok().json(response.with_sections(report.sections).succeeded())
    } else {
        HttpResponse::BadGateway().json(
            response
                .with_sections(report.sections)
                .failed(GENERIC_FAILURE_MESSAGE),
        )
    }
}
