//! # Pitcher Backend - Main Application Entry Point
//!
//! HTTP service that transposes uploaded MP3 files by a number of semitones.
//! The pitch shift itself is done by ffmpeg; this server owns everything around it:
//! admission of uploads, staging of scratch files, invoking the filter engine,
//! cleanup, and streaming the result back.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **error**: Error types and their HTTP responses
//! - **intake**: Multipart parsing and admission rules for uploads
//! - **transform**: The filter engine, scratch files and the transform pipeline
//! - **state**: Shared application state and metrics
//! - **health**: Health and metrics endpoints
//! - **middleware**: Request logging and metrics collection
//! - **handlers**: HTTP request handlers and route registration

mod config;
mod error;
mod handlers;
mod health;
mod intake;
mod middleware;
mod state;
mod transform;

use crate::config::AppConfig;
use crate::state::AppState;
use crate::transform::{EngineHandle, FfmpegEngine, GraphOptions, Transformer};
use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once SIGINT or SIGTERM arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging**
/// 3. **Builds the engine handle and transform pipeline** (the engine itself loads on first use)
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown** when receiving system signals
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting pitcher-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    info!(
        ffmpeg = %config.engine.ffmpeg_path,
        scratch_dir = %config.engine.scratch_dir.display(),
        pitch_filter = ?config.engine.pitch_filter,
        max_jobs = config.engine.max_concurrent_jobs,
        "Filter engine configured (loads on first request)"
    );

    let engine = FfmpegEngine::new(config.engine.ffmpeg_path.clone(), config.engine.scratch_dir.clone());
    let handle = EngineHandle::new(
        Arc::new(engine),
        config.engine.max_concurrent_jobs,
        Duration::from_secs(config.engine.invoke_timeout_secs),
    );
    let transformer = Transformer::new(handle, GraphOptions::from(&config.engine));

    let app_state = AppState::new(config.clone(), transformer);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allow_any_header()
            .expose_headers(vec![middleware::REQUEST_ID_HEADER, "x-transform-id"])
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .configure(handlers::configure)
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "pitcher_backend=trace")
/// - If not set, defaults to "pitcher_backend=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pitcher_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM and SIGINT and raise the shutdown flag on the first one.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let (mut sigterm, mut sigint) = match (
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()),
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
