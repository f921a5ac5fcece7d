//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER__HOST, APP_ENGINE__FFMPEG_PATH, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! ## Sections:
//! - **server**: Where the HTTP server listens
//! - **intake**: Upload admission rules (size ceiling, allowed pitch range)
//! - **engine**: How the ffmpeg filter engine is located, bounded and tuned

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Each group maps to one stage of the request: the server accepts it,
/// intake validates it, the engine transforms it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub intake: IntakeConfig,
    pub engine: EngineConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Upload admission rules, enforced before any transform work starts.
///
/// ## Fields:
/// - `max_upload_bytes`: Hard ceiling for the uploaded file (8 MiB by default)
/// - `min_pitch` / `max_pitch`: Inclusive semitone range accepted from clients.
///   Zero is always rejected, a zero shift is not a transposition.
/// - `upload_dir`: Where intake persists the raw upload while the request is alive.
///   `None` means the system temp directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    pub max_upload_bytes: usize,
    pub min_pitch: i32,
    pub max_pitch: i32,
    pub upload_dir: Option<PathBuf>,
}

/// Filter engine settings.
///
/// ## Fields:
/// - `ffmpeg_path`: Binary to invoke (looked up on `PATH` when not absolute)
/// - `scratch_dir`: Shared scratch namespace for staged and encoded files
/// - `reference_sample_rate`: Rate every pitch graph resamples to and from (Hz)
/// - `pitch_filter`: `resample_tempo` or `rubberband`
/// - `preserve_duration`: Whether `resample_tempo` compensates the duration with `atempo`
/// - `max_concurrent_jobs`: Number of ffmpeg processes allowed to run at once
/// - `invoke_timeout_secs`: Upper bound for a single ffmpeg run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub ffmpeg_path: String,
    pub scratch_dir: PathBuf,
    pub reference_sample_rate: u32,
    pub pitch_filter: PitchFilter,
    pub preserve_duration: bool,
    pub max_concurrent_jobs: usize,
    pub invoke_timeout_secs: u64,
}

/// Which ffmpeg filter family performs the pitch shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchFilter {
    /// Reinterpret the sample rate, then stretch tempo back (works on every ffmpeg build)
    ResampleTempo,
    /// librubberband pitch filter (needs an ffmpeg built with `--enable-librubberband`)
    Rubberband,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            intake: IntakeConfig {
                max_upload_bytes: 8 * 1024 * 1024,
                min_pitch: -4,
                max_pitch: 4,
                upload_dir: None,
            },
            engine: EngineConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                scratch_dir: env::temp_dir().join("pitcher-scratch"),
                reference_sample_rate: 48_000,
                pitch_filter: PitchFilter::ResampleTempo,
                preserve_duration: true,
                max_concurrent_jobs: 2,
                invoke_timeout_secs: 60,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_INTAKE__MAX_UPLOAD_BYTES=4194304`: Lower the upload ceiling
    /// - `APP_ENGINE__PITCH_FILTER=rubberband`: Switch the pitch filter
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // Double underscore separates sections, single underscores stay inside key names
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - The pitch range is ordered and contains at least one non-zero value
    /// - Upload ceiling, sample rate, job limit and timeout are all positive
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.intake.min_pitch > self.intake.max_pitch {
            return Err(anyhow::anyhow!(
                "Pitch range is inverted: min {} > max {}",
                self.intake.min_pitch,
                self.intake.max_pitch
            ));
        }

        if self.intake.min_pitch == 0 && self.intake.max_pitch == 0 {
            return Err(anyhow::anyhow!("Pitch range must allow at least one non-zero shift"));
        }

        if self.intake.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Upload ceiling must be greater than 0"));
        }

        if self.engine.reference_sample_rate == 0 {
            return Err(anyhow::anyhow!("Reference sample rate must be greater than 0"));
        }

        if self.engine.max_concurrent_jobs == 0 {
            return Err(anyhow::anyhow!("Max concurrent jobs must be greater than 0"));
        }

        if self.engine.invoke_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Engine timeout must be greater than 0"));
        }

        if self.engine.ffmpeg_path.trim().is_empty() {
            return Err(anyhow::anyhow!("ffmpeg path cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.intake.max_upload_bytes, 8 * 1024 * 1024);
        assert_eq!((config.intake.min_pitch, config.intake.max_pitch), (-4, 4));
        assert_eq!(config.engine.pitch_filter, PitchFilter::ResampleTempo);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.intake.min_pitch = 3;
        config.intake.max_pitch = -3;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.intake.min_pitch = 0;
        config.intake.max_pitch = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.engine.max_concurrent_jobs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pitch_filter_names() {
        let filter: PitchFilter = serde_json::from_str(r#""rubberband""#).unwrap();
        assert_eq!(filter, PitchFilter::Rubberband);
        assert_eq!(
            serde_json::to_string(&PitchFilter::ResampleTempo).unwrap(),
            r#""resample_tempo""#
        );
    }
}
