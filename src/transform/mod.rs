//! # Transform Module
//!
//! Everything between an accepted upload and the encoded bytes sent back.
//!
//! ## Key Components:
//! - **filter**: Typed filter graphs derived from the requested transform
//! - **engine**: The filter engine contract and the shared, init-once handle
//! - **ffmpeg**: The production engine, driving the `ffmpeg` binary
//! - **scratch**: Uniquely named working files with guaranteed cleanup
//! - **orchestrator**: The staged pipeline tying the pieces together

pub mod engine;
pub mod error;
pub mod ffmpeg;
pub mod filter;
pub mod orchestrator;
pub mod scratch;

#[cfg(test)]
pub mod testing;

pub use engine::EngineHandle;
pub use error::TransformError;
pub use ffmpeg::FfmpegEngine;
pub use filter::{GraphOptions, TransformRequest};
pub use orchestrator::{TransformOutput, Transformer};
