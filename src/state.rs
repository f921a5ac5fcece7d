//! # Application State Management
//!
//! Shared state handed to every request handler through `web::Data<AppState>`.
//!
//! ## What lives here:
//! - **config**: The configuration the server was started with
//! - **metrics**: Per-endpoint request counters and transform outcomes
//! - **transformer**: The pipeline and its single engine handle, shared by all requests
//! - **start_time**: For the uptime reported by the health endpoint
//!
//! ## Arc<RwLock<T>> Pattern
//! Multiple requests run simultaneously and all update the same metrics, so the
//! mutable parts sit behind `Arc<RwLock<T>>`. Locks are only held for a few
//! arithmetic operations and never across an `.await`.

use crate::config::AppConfig;
use crate::transform::Transformer;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub transformer: Transformer,
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Requests answered with a 4xx/5xx status
    pub error_count: u64,

    /// Transforms currently between intake and response
    pub transforms_in_flight: u32,

    /// Transforms that produced audio
    pub transforms_succeeded: u64,

    /// Transforms rejected by the pipeline (not by intake)
    pub transforms_failed: u64,

    /// Key: route pattern with method (e.g., "POST /api/pitch")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

/// Marks one transform as in flight until dropped.
///
/// Dropping instead of calling a "finish" method keeps the gauge right when the
/// handler future is cancelled half-way.
pub struct TransformSlot {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for TransformSlot {
    fn drop(&mut self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.transforms_in_flight = metrics.transforms_in_flight.saturating_sub(1);
    }
}

impl AppState {
    pub fn new(config: AppConfig, transformer: Transformer) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            transformer,
            start_time: Instant::now(),
        }
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    fn read_metrics(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_metrics(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one finished request (called by the metrics middleware).
    pub fn record_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.write_metrics();
        metrics.request_count += 1;
        if is_error {
            metrics.error_count += 1;
        }

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn begin_transform(&self) -> TransformSlot {
        self.write_metrics().transforms_in_flight += 1;
        TransformSlot {
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub fn record_transform(&self, succeeded: bool) {
        let mut metrics = self.write_metrics();
        if succeeded {
            metrics.transforms_succeeded += 1;
        } else {
            metrics.transforms_failed += 1;
        }
    }

    /// Copy of the current metrics, so no lock is held while building a response.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.read_metrics().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
