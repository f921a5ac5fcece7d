//! In-memory [`FilterEngine`] for tests. Records every call so tests can assert
//! on load counts, invocations, and what is left in the scratch namespace.
//!
//! `run` produces `ENC[<filter>]` followed by the input bytes, so every output
//! can be traced back to the input it came from.

use crate::transform::engine::{EngineInvocation, FilterEngine};
use crate::transform::TransformError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MemoryEngine {
    files: Mutex<HashMap<String, Vec<u8>>>,
    loads: AtomicUsize,
    runs: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    delete_attempts: AtomicUsize,
    fail_load: bool,
    fail_run: bool,
    fail_delete: bool,
    skip_output: bool,
    run_delay: Option<Duration>,
    delete_delay: Option<Duration>,
    load_delay: Option<Duration>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// `run` writes a partial output file and then fails.
    pub fn failing_run(mut self) -> Self {
        self.fail_run = true;
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    /// `run` succeeds without writing anything.
    pub fn skipping_output(mut self) -> Self {
        self.skip_output = true;
        self
    }

    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = Some(delay);
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// `delete_file` sleeps before removing, so a deletion can be cancelled mid-way.
    pub fn with_delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = Some(delay);
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn max_parallel_runs(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn delete_attempts(&self) -> usize {
        self.delete_attempts.load(Ordering::SeqCst)
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn output_for(filter: &str, input: &[u8]) -> Vec<u8> {
        let mut out = format!("ENC[{}]", filter).into_bytes();
        out.extend_from_slice(input);
        out
    }
}

#[async_trait]
impl FilterEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self) -> Result<(), TransformError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_load {
            return Err(TransformError::Init("memory engine refused to load".to_string()));
        }
        Ok(())
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), TransformError> {
        self.files.lock().unwrap().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, TransformError> {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| TransformError::MissingOutput(name.to_string()))
    }

    async fn delete_file(&self, name: &str) -> Result<(), TransformError> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delete_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_delete {
            return Err(TransformError::Io(format!("cannot delete {}", name)));
        }
        self.files.lock().unwrap().remove(name);
        Ok(())
    }

    async fn run(&self, invocation: &EngineInvocation) -> Result<(), TransformError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now_running, Ordering::SeqCst);
        let _running = RunningGuard(&self.running);

        if let Some(delay) = self.run_delay {
            tokio::time::sleep(delay).await;
        }
        self.produce(invocation)
    }
}

/// Decrements the running count even when the run future is dropped by a timeout.
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryEngine {
    fn produce(&self, invocation: &EngineInvocation) -> Result<(), TransformError> {
        let mut files = self.files.lock().unwrap();
        let input = files
            .get(&invocation.input)
            .cloned()
            .ok_or_else(|| TransformError::Invoke(format!("{}: No such file", invocation.input)))?;

        if self.fail_run {
            files.insert(invocation.output.clone(), b"partial".to_vec());
            return Err(TransformError::Invoke("Invalid data found when processing input".to_string()));
        }
        if !self.skip_output {
            let filter = invocation.filter.to_string();
            files.insert(invocation.output.clone(), Self::output_for(&filter, &input));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::filter::{FilterGraph, GraphOptions, TransformRequest};

    #[tokio::test]
    async fn test_timed_out_run_is_not_counted_as_running() {
        let engine = MemoryEngine::new().with_run_delay(Duration::from_millis(20));
        engine.write_file("a.mp3", b"in").await.unwrap();
        let invocation = EngineInvocation {
            input: "a.mp3".to_string(),
            output: "a-enc.mp3".to_string(),
            filter: FilterGraph::for_request(TransformRequest::Resample, &GraphOptions::default()),
        };

        let cancelled = tokio::time::timeout(Duration::from_millis(2), engine.run(&invocation)).await;
        assert!(cancelled.is_err());

        engine.run(&invocation).await.unwrap();
        assert_eq!(engine.run_count(), 2);
        assert_eq!(engine.max_parallel_runs(), 1);
    }
}
