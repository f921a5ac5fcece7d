//! # Upload Intake
//!
//! Reads the raw multipart body of a transform request and decides whether it
//! may enter the pipeline. Everything here runs before the filter engine is touched.
//!
//! ## Admission Rules:
//! - **file**: exactly one part named `file`, non-empty, no larger than the
//!   configured ceiling, and (if a content type is declared) an audio type
//! - **pitch**: in pitch mode, exactly one part named `pitch` holding a non-zero
//!   integer inside the configured inclusive range
//!
//! Any violation is a [`AppError::ValidationError`]; nothing is partially accepted.
//!
//! ## Upload persistence
//! The file part is streamed straight into a [`NamedTempFile`] and checked against
//! the ceiling chunk by chunk, so an oversized upload is refused without being
//! buffered. The temp file lives exactly as long as the [`PitchRequest`].

use crate::config::IntakeConfig;
use crate::error::{AppError, AppResult};
use crate::transform::{TransformError, TransformRequest};
use actix_multipart::{Field, Multipart};
use futures_util::stream::StreamExt;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Largest accepted `pitch` part; anything longer is not a small integer.
const MAX_PITCH_FIELD_BYTES: usize = 16;

/// Which multipart fields a route expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeMode {
    /// `file` and `pitch`
    PitchShift,
    /// `file` only
    Resample,
}

/// The uploaded audio, persisted by intake for the orchestrator to read.
#[derive(Debug)]
pub struct UploadedAudio {
    file: NamedTempFile,
    size: usize,
    filename: Option<String>,
}

impl UploadedAudio {
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub async fn read_bytes(&self) -> Result<Vec<u8>, TransformError> {
        Ok(tokio::fs::read(self.file.path()).await?)
    }
}

/// An upload that passed every admission rule.
#[derive(Debug)]
pub struct PitchRequest {
    pub audio: UploadedAudio,
    pub transform: TransformRequest,
}

/// Parse and validate a client-supplied pitch.
pub fn parse_pitch(raw: &str, rules: &IntakeConfig) -> AppResult<i32> {
    let invalid = || {
        AppError::ValidationError(format!(
            "Pitch must be a non-zero integer between {} and {}",
            rules.min_pitch, rules.max_pitch
        ))
    };

    let pitch: i32 = raw.trim().parse().map_err(|_| invalid())?;
    if pitch == 0 || pitch < rules.min_pitch || pitch > rules.max_pitch {
        return Err(invalid());
    }
    Ok(pitch)
}

/// Read the whole multipart body and build a [`PitchRequest`].
pub async fn read_pitch_request(
    mut payload: Multipart,
    mode: IntakeMode,
    rules: &IntakeConfig,
) -> AppResult<PitchRequest> {
    let mut audio: Option<UploadedAudio> = None;
    let mut pitch_raw: Option<String> = None;

    while let Some(item) = payload.next().await {
        let mut field: Field = item?;

        let field_name = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .map(str::to_string)
            .ok_or_else(|| AppError::ValidationError("Missing field name".to_string()))?;

        match field_name.as_str() {
            "file" => {
                if audio.is_some() {
                    return Err(AppError::ValidationError(
                        "Exactly one file must be uploaded".to_string(),
                    ));
                }
                audio = Some(persist_file(&mut field, rules).await?);
            }
            "pitch" if mode == IntakeMode::PitchShift => {
                if pitch_raw.is_some() {
                    return Err(AppError::ValidationError(
                        "Pitch must be supplied once".to_string(),
                    ));
                }
                pitch_raw = Some(read_text(&mut field, MAX_PITCH_FIELD_BYTES).await?);
            }
            other => {
                debug!(field = %other, "Ignoring unexpected multipart field");
                drain(&mut field).await?;
            }
        }
    }

    let audio = audio.ok_or_else(|| AppError::ValidationError("No audio file provided".to_string()))?;

    let transform = match mode {
        IntakeMode::Resample => TransformRequest::Resample,
        IntakeMode::PitchShift => {
            let raw = pitch_raw
                .ok_or_else(|| AppError::ValidationError("No pitch provided".to_string()))?;
            TransformRequest::PitchShift {
                semitones: parse_pitch(&raw, rules)?,
            }
        }
    };

    debug!(
        bytes = audio.len(),
        filename = audio.filename().unwrap_or("unknown"),
        request = %transform.label(),
        "Upload accepted"
    );

    Ok(PitchRequest { audio, transform })
}

/// Stream a file part into a temp file, enforcing type, emptiness and size rules.
async fn persist_file(field: &mut Field, rules: &IntakeConfig) -> AppResult<UploadedAudio> {
    if let Some(mime) = field.content_type() {
        let essence = mime.essence_str();
        if !essence.starts_with("audio/") && essence != "application/octet-stream" {
            return Err(AppError::ValidationError(format!(
                "Unsupported file type: {}",
                essence
            )));
        }
    }

    let filename = field
        .content_disposition()
        .and_then(|cd| cd.get_filename())
        .map(str::to_string);

    let temp = match &rules.upload_dir {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new(),
    }
    .map_err(TransformError::from)?;
    let mut sink = tokio::fs::File::from_std(temp.as_file().try_clone().map_err(TransformError::from)?);

    let mut size = 0usize;
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        size += chunk.len();
        if size > rules.max_upload_bytes {
            return Err(AppError::ValidationError(format!(
                "File too large (max: {} bytes)",
                rules.max_upload_bytes
            )));
        }
        sink.write_all(&chunk).await.map_err(TransformError::from)?;
    }
    sink.flush().await.map_err(TransformError::from)?;

    if size == 0 {
        return Err(AppError::ValidationError("Uploaded file is empty".to_string()));
    }

    Ok(UploadedAudio {
        file: temp,
        size,
        filename,
    })
}

async fn read_text(field: &mut Field, limit: usize) -> AppResult<String> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        if bytes.len() + chunk.len() > limit {
            return Err(AppError::ValidationError(format!(
                "Field is longer than {} bytes",
                limit
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes).map_err(|_| AppError::ValidationError("Field is not valid UTF-8".to_string()))
}

async fn drain(field: &mut Field) -> AppResult<()> {
    while let Some(chunk) = field.next().await {
        chunk?;
    }
    Ok(())
}
