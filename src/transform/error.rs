use std::fmt;
use std::io;
use std::time::Duration;

/// Failures of the transform pipeline, from engine start-up to result retrieval.
///
/// None of these are shown to clients verbatim; the HTTP layer maps them all to
/// one generic message and logs the detail.
#[derive(Debug)]
pub enum TransformError {
    /// The engine could not be loaded (binary missing, scratch dir not writable, ...)
    Init(String),

    /// The engine ran and reported failure
    Invoke(String),

    /// The engine did not finish within the configured bound
    Timeout(Duration),

    /// The engine reported success but the encoded file is absent or empty
    MissingOutput(String),

    /// Reading, writing or naming a scratch or upload file failed
    Io(String),
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::Init(msg) => write!(f, "engine initialization failed: {}", msg),
            TransformError::Invoke(msg) => write!(f, "filter invocation failed: {}", msg),
            TransformError::Timeout(limit) => {
                write!(f, "filter invocation timed out after {:.1}s", limit.as_secs_f64())
            }
            TransformError::MissingOutput(name) => write!(f, "engine produced no output in {}", name),
            TransformError::Io(msg) => write!(f, "scratch i/o failed: {}", msg),
        }
    }
}

impl std::error::Error for TransformError {}

impl From<io::Error> for TransformError {
    fn from(err: io::Error) -> Self {
        TransformError::Io(err.to_string())
    }
}
