//! # Transform Orchestrator
//!
//! Turns (audio bytes, transform request) into encoded audio bytes through the
//! shared filter engine. The steps run strictly in order:
//!
//! 1. **Readiness**: load the engine if no earlier request has
//! 2. **Staging**: write the input to `<id>.mp3` in scratch storage
//! 3. **Graph**: build the filter chain for the request
//! 4. **Invoke**: run the engine from `<id>.mp3` to `<id>-enc.mp3`
//! 5. **Retrieve**: read `<id>-enc.mp3` back
//! 6. **Cleanup**: delete both files, on success and failure alike
//!
//! A failure in steps 1-5 becomes a [`TransformError`]. A cleanup failure is
//! logged and never replaces the outcome of the earlier steps.

use crate::transform::engine::{EngineHandle, EngineInvocation};
use crate::transform::filter::{FilterGraph, GraphOptions, TransformRequest};
use crate::transform::scratch::WorkingFiles;
use crate::transform::TransformError;
use actix_web::web::Bytes;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Encoded audio ready to be sent back.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub id: Uuid,
    pub bytes: Bytes,
}

impl TransformOutput {
    pub const CONTENT_TYPE: &'static str = "audio/mpeg";

    pub fn content_length(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone)]
pub struct Transformer {
    engine: EngineHandle,
    options: GraphOptions,
}

impl Transformer {
    pub fn new(engine: EngineHandle, options: GraphOptions) -> Self {
        Self { engine, options }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub async fn transform(
        &self,
        input: &[u8],
        request: TransformRequest,
    ) -> Result<TransformOutput, TransformError> {
        let started = Instant::now();
        self.engine.ensure_ready().await?;

        let files = WorkingFiles::allocate(self.engine.engine());
        let id = files.id();
        debug!(id = %id, request = %request.label(), input_bytes = input.len(), "Transform started");

        let outcome = self.run_staged(&files, input, request).await;

        let failed_deletes = files.release().await;
        if failed_deletes > 0 {
            warn!(id = %id, failed_deletes, "Scratch cleanup incomplete");
        }

        match &outcome {
            Ok(bytes) => info!(
                id = %id,
                request = %request.label(),
                input_bytes = input.len(),
                output_bytes = bytes.len(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Transform completed"
            ),
            Err(e) => warn!(
                id = %id,
                request = %request.label(),
                error = %e,
                duration_ms = started.elapsed().as_millis() as u64,
                "Transform failed"
            ),
        }

        outcome.map(|bytes| TransformOutput {
            id,
            bytes: Bytes::from(bytes),
        })
    }

    async fn run_staged(
        &self,
        files: &WorkingFiles,
        input: &[u8],
        request: TransformRequest,
    ) -> Result<Vec<u8>, TransformError> {
        let engine = self.engine.engine();
        engine.write_file(files.source_name(), input).await?;

        let invocation = EngineInvocation {
            input: files.source_name().to_string(),
            output: files.encoded_name().to_string(),
            filter: FilterGraph::for_request(request, &self.options),
        };
        self.engine.invoke(&invocation).await?;

        let produced = engine.read_file(files.encoded_name()).await?;
        if produced.is_empty() {
            return Err(TransformError::MissingOutput(files.encoded_name().to_string()));
        }
        Ok(produced)
    }
}
