use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Effective configuration, as loaded at start-up.
///
/// ## Endpoint: `GET /api/v1/config`
///
/// Read-only: the engine and its scratch namespace are built from this once,
/// so changing it at runtime would leave them out of sync.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "intake": {
                "max_upload_bytes": config.intake.max_upload_bytes,
                "min_pitch": config.intake.min_pitch,
                "max_pitch": config.intake.max_pitch
            },
            "engine": {
                "ffmpeg_path": config.engine.ffmpeg_path,
                "reference_sample_rate": config.engine.reference_sample_rate,
                "pitch_filter": config.engine.pitch_filter,
                "preserve_duration": config.engine.preserve_duration,
                "max_concurrent_jobs": config.engine.max_concurrent_jobs,
                "invoke_timeout_secs": config.engine.invoke_timeout_secs
            }
        }
    })))
}

#[cfg(test)]
mod tests {
    use crate::config::AppConfig;
    use crate::handlers::configure;
    use crate::state::tests::state_with;
    use crate::transform::testing::MemoryEngine;
    use actix_web::{test, web, App};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_config_endpoint_reports_intake_rules() {
        let state = state_with(Arc::new(MemoryEngine::new()), AppConfig::default());
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/v1/config").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["config"]["intake"]["min_pitch"], -4);
        assert_eq!(body["config"]["intake"]["max_pitch"], 4);
        assert_eq!(body["config"]["engine"]["reference_sample_rate"], 48000);
    }
}
