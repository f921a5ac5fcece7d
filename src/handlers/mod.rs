pub mod config;
pub mod pitch;

use crate::health;
use actix_web::web;

/// Register every route. Shared by `main` and the handler tests so both see the same app.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/pitch")
            .route(web::post().to(pitch::transpose))
            .default_service(web::to(pitch::method_not_found)),
    )
    .service(
        web::resource("/api/resample")
            .route(web::post().to(pitch::resample))
            .default_service(web::to(pitch::method_not_found)),
    )
    .service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            .route("/config", web::get().to(config::get_config)),
    )
    .route("/health", web::get().to(health::health_check));
}
