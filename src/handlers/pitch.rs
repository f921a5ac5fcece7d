//! # Transform Endpoints
//!
//! ## Available Endpoints:
//! - `POST /api/pitch` - multipart `file` + `pitch`, returns the transposed MP3
//! - `POST /api/resample` - multipart `file`, returns the re-encoded MP3 at the reference rate
//!
//! Any other method on these paths answers 404.
//!
//! ## Response:
//! `200 OK`, `Content-Type: audio/mpeg`, exact `Content-Length`, body streamed in chunks.
//! Failures answer 400 with `{ "message": ... }`.

use crate::error::{AppError, AppResult};
use crate::intake::{self, IntakeMode};
use crate::state::AppState;
use crate::transform::TransformOutput;
use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use std::convert::Infallible;
use tracing::error;

/// Size of each body chunk when streaming the encoded audio back.
const RESPONSE_CHUNK_BYTES: usize = 64 * 1024;

pub async fn transpose(state: web::Data<AppState>, payload: Multipart) -> AppResult<HttpResponse> {
    process(state, payload, IntakeMode::PitchShift).await
}

pub async fn resample(state: web::Data<AppState>, payload: Multipart) -> AppResult<HttpResponse> {
    process(state, payload, IntakeMode::Resample).await
}

pub async fn method_not_found() -> AppResult<HttpResponse> {
    Err(AppError::NotFound("Method not found".to_string()))
}

async fn process(
    state: web::Data<AppState>,
    payload: Multipart,
    mode: IntakeMode,
) -> AppResult<HttpResponse> {
    let request = intake::read_pitch_request(payload, mode, &state.get_config().intake).await?;
    let input = request.audio.read_bytes().await?;

    let _slot = state.begin_transform();
    match state.transformer.transform(&input, request.transform).await {
        Ok(output) => {
            state.record_transform(true);
            Ok(audio_response(output))
        }
        Err(e) => {
            error!(
                request = %request.transform.label(),
                upload_bytes = request.audio.len(),
                error = %e,
                "Transform request failed"
            );
            state.record_transform(false);
            Err(e.into())
        }
    }
}

/// Stream the encoded bytes with an exact length, so the response is never chunk-encoded.
fn audio_response(output: TransformOutput) -> HttpResponse {
    let length = output.content_length();
    let id = output.id.to_string();
    let bytes = output.bytes;
    let total = bytes.len();

    let chunks = (0..total).step_by(RESPONSE_CHUNK_BYTES).map(move |start| {
        let end = (start + RESPONSE_CHUNK_BYTES).min(total);
        Ok::<_, Infallible>(bytes.slice(start..end))
    });

    HttpResponse::Ok()
        .content_type(TransformOutput::CONTENT_TYPE)
        .insert_header((header::CONTENT_LENGTH, length))
        .insert_header(("x-transform-id", id))
        .streaming(tokio_stream::iter(chunks))
}
