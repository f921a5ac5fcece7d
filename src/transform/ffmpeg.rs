//! # ffmpeg Engine
//!
//! [`FilterEngine`] backed by the `ffmpeg` command-line tool. The scratch
//! namespace is a directory on disk; every run is a separate child process
//! started in that directory, so names passed to ffmpeg are plain file names.

use crate::transform::engine::{EngineInvocation, FilterEngine};
use crate::transform::TransformError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// How much of ffmpeg's stderr is kept in an error message.
const STDERR_TAIL_BYTES: usize = 512;

pub struct FfmpegEngine {
    binary: String,
    scratch_dir: PathBuf,
}

impl FfmpegEngine {
    pub fn new(binary: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Resolve a scratch name to a path, refusing anything that could escape the directory.
    fn scratch_path(&self, name: &str) -> Result<PathBuf, TransformError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\'])
            && !name.contains('\0');
        if !valid {
            return Err(TransformError::Io(format!("invalid scratch file name {:?}", name)));
        }
        Ok(self.scratch_dir.join(name))
    }
}

/// Argument list for one run. Output is always MP3 and overwrites stale files.
pub fn command_args(invocation: &EngineInvocation) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        invocation.input.clone(),
        // embedded cover art would otherwise be treated as a video stream
        "-vn".to_string(),
        "-af".to_string(),
        invocation.filter.to_string(),
        "-f".to_string(),
        "mp3".to_string(),
        invocation.output.clone(),
    ]
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

#[async_trait]
impl FilterEngine for FfmpegEngine {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    /// Create the scratch directory and make sure the binary actually runs.
    async fn load(&self) -> Result<(), TransformError> {
        tokio::fs::create_dir_all(&self.scratch_dir).await.map_err(|e| {
            TransformError::Init(format!(
                "cannot create scratch dir {}: {}",
                self.scratch_dir.display(),
                e
            ))
        })?;

        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-version"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TransformError::Init(format!("cannot start {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(TransformError::Init(format!(
                "{} -version exited with {}",
                self.binary, output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!(
            binary = %self.binary,
            scratch_dir = %self.scratch_dir.display(),
            version = version.lines().next().unwrap_or("unknown"),
            "ffmpeg available"
        );
        Ok(())
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), TransformError> {
        let path = self.scratch_path(name)?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, TransformError> {
        let path = self.scratch_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(TransformError::MissingOutput(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_file(&self, name: &str) -> Result<(), TransformError> {
        let path = self.scratch_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn run(&self, invocation: &EngineInvocation) -> Result<(), TransformError> {
        self.scratch_path(&invocation.input)?;
        self.scratch_path(&invocation.output)?;

        let args = command_args(invocation);
        debug!(binary = %self.binary, args = ?args, "Spawning ffmpeg");

        let output = Command::new(&self.binary)
            .args(&args)
            .current_dir(&self.scratch_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TransformError::Invoke(format!("cannot start {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(TransformError::Invoke(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        Ok(())
    }
}
