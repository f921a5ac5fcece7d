use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Liveness plus a summary of the transform pipeline.
///
/// The engine is loaded lazily, so `"ready": false` right after start-up is normal.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let engine = state.transformer.engine();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "engine": {
            "name": engine.name(),
            "ready": engine.is_ready(),
            "busy_jobs": engine.busy_jobs(),
            "max_concurrent_jobs": engine.max_jobs(),
            "invocations": engine.invocation_count(),
            "pitch_filter": config.engine.pitch_filter
        },
        "transforms": {
            "in_flight": metrics.transforms_in_flight,
            "succeeded": metrics.transforms_succeeded,
            "failed": metrics.transforms_failed
        },
        "requests": {
            "total": metrics.request_count,
            "errors": metrics.error_count,
            "error_rate": metrics.error_rate()
        }
    }))
}

/// Per-endpoint request statistics.
pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "transforms": {
            "in_flight": metrics.transforms_in_flight,
            "succeeded": metrics.transforms_succeeded,
            "failed": metrics.transforms_failed
        },
        "endpoints": endpoint_stats
    }))
}
