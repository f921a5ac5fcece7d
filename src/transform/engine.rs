//! # Filter Engine Contract
//!
//! The orchestrator talks to the external filter engine only through
//! [`FilterEngine`]: load it once, put files into its scratch namespace, run a
//! filter graph from one named file to another, read the result back and delete
//! what it staged.
//!
//! ## Shared engine handle
//! [`EngineHandle`] is the single process-wide owner of the engine:
//! - **Init-once**: `ensure_ready` loads the engine on first use only. A failed
//!   load leaves the handle unloaded so the next request tries again.
//! - **Bounded invocation**: a semaphore caps how many filter runs execute at once.
//!   Each run works on its own uniquely named files, so the cap is about CPU
//!   admission rather than protecting shared data.
//! - **Timeout**: every run is bounded; an expired run is dropped (and its child
//!   process killed) and reported as [`TransformError::Timeout`].

use crate::transform::filter::FilterGraph;
use crate::transform::TransformError;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info, warn};

/// One filter run: read `input`, apply `filter`, write `output`.
/// Both names live in the engine's scratch namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInvocation {
    pub input: String,
    pub output: String,
    pub filter: FilterGraph,
}

/// The external audio filter engine as seen by the orchestrator.
#[async_trait]
pub trait FilterEngine: Send + Sync + 'static {
    /// Short name for logs and the health endpoint.
    fn name(&self) -> &'static str;

    /// Expensive one-time preparation. Called through [`EngineHandle::ensure_ready`] only.
    async fn load(&self) -> Result<(), TransformError>;

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), TransformError>;

    /// Reading a file that does not exist yields [`TransformError::MissingOutput`].
    async fn read_file(&self, name: &str) -> Result<Vec<u8>, TransformError>;

    /// Deleting a file that does not exist succeeds.
    async fn delete_file(&self, name: &str) -> Result<(), TransformError>;

    async fn run(&self, invocation: &EngineInvocation) -> Result<(), TransformError>;
}

/// Process-wide, cheaply clonable handle to the one engine instance.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<EngineShared>,
}

struct EngineShared {
    engine: Arc<dyn FilterEngine>,
    ready: OnceCell<()>,
    permits: Semaphore,
    max_jobs: usize,
    invoke_timeout: Duration,
    invocations: AtomicU64,
}

impl EngineHandle {
    pub fn new(engine: Arc<dyn FilterEngine>, max_jobs: usize, invoke_timeout: Duration) -> Self {
        let max_jobs = max_jobs.max(1);
        Self {
            inner: Arc::new(EngineShared {
                engine,
                ready: OnceCell::new(),
                permits: Semaphore::new(max_jobs),
                max_jobs,
                invoke_timeout,
                invocations: AtomicU64::new(0),
            }),
        }
    }

    /// The engine itself, for scratch-file operations.
    pub fn engine(&self) -> Arc<dyn FilterEngine> {
        Arc::clone(&self.inner.engine)
    }

    pub fn name(&self) -> &'static str {
        self.inner.engine.name()
    }

    /// Load the engine unless an earlier call already did.
    ///
    /// Concurrent first callers wait on the same load; only one `load` runs.
    /// The load is bounded by the invoke timeout, and a failed or timed-out load
    /// is retried by the next caller.
    pub async fn ensure_ready(&self) -> Result<(), TransformError> {
        self.inner
            .ready
            .get_or_try_init(|| async {
                info!(engine = self.name(), "Loading filter engine");
                let loaded = tokio::time::timeout(self.inner.invoke_timeout, self.inner.engine.load())
                    .await
                    .unwrap_or(Err(TransformError::Timeout(self.inner.invoke_timeout)));
                match loaded {
                    Ok(()) => {
                        info!(engine = self.name(), "Filter engine ready");
                        Ok(())
                    }
                    Err(e) => {
                        warn!(engine = self.name(), error = %e, "Filter engine failed to load");
                        Err(e)
                    }
                }
            })
            .await
            .map(|_| ())
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.initialized()
    }

    /// Run one invocation under the concurrency cap and the timeout.
    pub async fn invoke(&self, invocation: &EngineInvocation) -> Result<(), TransformError> {
        let _permit = self
            .inner
            .permits
            .acquire()
            .await
            .map_err(|_| TransformError::Init("engine is shutting down".to_string()))?;

        self.inner.invocations.fetch_add(1, Ordering::Relaxed);
        debug!(
            input = %invocation.input,
            output = %invocation.output,
            filter = %invocation.filter,
            "Invoking filter engine"
        );

        match tokio::time::timeout(self.inner.invoke_timeout, self.inner.engine.run(invocation)).await {
            Ok(result) => result,
            Err(_) => Err(TransformError::Timeout(self.inner.invoke_timeout)),
        }
    }

    /// Number of filter runs started since the process began.
    pub fn invocation_count(&self) -> u64 {
        self.inner.invocations.load(Ordering::Relaxed)
    }

    pub fn max_jobs(&self) -> usize {
        self.inner.max_jobs
    }

    /// Runs currently holding a permit.
    pub fn busy_jobs(&self) -> usize {
        self.inner.max_jobs - self.inner.permits.available_permits()
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("engine", &self.name())
            .field("ready", &self.is_ready())
            .field("max_jobs", &self.inner.max_jobs)
            .field("invoke_timeout", &self.inner.invoke_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::filter::{GraphOptions, TransformRequest};
    use crate::transform::testing::MemoryEngine;

    fn invocation(input: &str, output: &str) -> EngineInvocation {
        EngineInvocation {
            input: input.to_string(),
            output: output.to_string(),
            filter: FilterGraph::for_request(TransformRequest::Resample, &GraphOptions::default()),
        }
    }

    #[tokio::test]
    async fn test_engine_loads_once() {
        let engine = Arc::new(MemoryEngine::new());
        let handle = EngineHandle::new(engine.clone(), 2, Duration::from_secs(5));

        assert!(!handle.is_ready());
        let (a, b) = tokio::join!(handle.ensure_ready(), handle.ensure_ready());
        assert!(a.is_ok() && b.is_ok());
        handle.ensure_ready().await.unwrap();

        assert!(handle.is_ready());
        assert_eq!(engine.load_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let engine = Arc::new(MemoryEngine::new().failing_load());
        let handle = EngineHandle::new(engine.clone(), 1, Duration::from_secs(5));

        assert!(matches!(handle.ensure_ready().await, Err(TransformError::Init(_))));
        assert!(handle.ensure_ready().await.is_err());
        assert!(!handle.is_ready());
        assert_eq!(engine.load_count(), 2);
    }

    #[tokio::test]
    async fn test_hung_load_times_out_and_is_retried() {
        let engine = Arc::new(MemoryEngine::new().with_load_delay(Duration::from_millis(500)));
        let handle = EngineHandle::new(engine.clone(), 1, Duration::from_millis(20));

        assert!(matches!(handle.ensure_ready().await, Err(TransformError::Timeout(_))));
        assert!(!handle.is_ready());
        assert!(matches!(handle.ensure_ready().await, Err(TransformError::Timeout(_))));
        assert_eq!(engine.load_count(), 2);
    }

    #[tokio::test]
    async fn test_invoke_times_out() {
        let engine = Arc::new(MemoryEngine::new().with_run_delay(Duration::from_millis(500)));
        let handle = EngineHandle::new(engine.clone(), 1, Duration::from_millis(20));
        engine.write_file("a.mp3", b"abc").await.unwrap();

        let result = handle.invoke(&invocation("a.mp3", "a-enc.mp3")).await;
        assert!(matches!(result, Err(TransformError::Timeout(_))));
        assert_eq!(handle.invocation_count(), 1);
        assert_eq!(handle.busy_jobs(), 0);
    }

    #[tokio::test]
    async fn test_invocations_are_capped() {
        let engine = Arc::new(MemoryEngine::new().with_run_delay(Duration::from_millis(50)));
        let handle = EngineHandle::new(engine.clone(), 1, Duration::from_secs(5));
        engine.write_file("a.mp3", b"a").await.unwrap();
        engine.write_file("b.mp3", b"b").await.unwrap();

        let first = invocation("a.mp3", "a-enc.mp3");
        let second = invocation("b.mp3", "b-enc.mp3");
        let (x, y) = tokio::join!(handle.invoke(&first), handle.invoke(&second));
        assert!(x.is_ok() && y.is_ok());
        assert_eq!(engine.max_parallel_runs(), 1);
    }
}
