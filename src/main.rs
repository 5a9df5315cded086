//! # FarmVoice Backend - Main Application Entry Point
//!
//! Real-time conversational gateway for the FarmSocial app: each client
//! opens one WebSocket and talks to the assistant in text or voice. Every
//! message runs through the staged pipeline (audio normalize → STT →
//! dialog → translate → TTS) and streams status frames plus one terminal
//! frame back over the same connection.
//!
//! ## Application Architecture:
//! - **config**: TOML + environment configuration
//! - **state**: shared metrics and runtime-updatable config
//! - **session**: per-connection registry and the slot-filling dialog engine
//! - **pipeline**: the per-message stage orchestrator and frame vocabulary
//! - **services**: HTTP adapters for the STT/LLM/translate/TTS services
//! - **history**: conversation store plus the background write queue
//! - **websocket**: the per-connection actor at `/ws/{client_id}`
//! - **handlers / health / middleware**: the plain HTTP surface

mod audio;
mod config;
mod error;
mod handlers;
mod health;
mod history;
mod middleware;
mod pipeline;
mod services;
mod session;
mod state;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer, middleware::Logger};
use anyhow::Result;
use config::AppConfig;
use history::{HistoryStore, HistoryWriter, InMemoryHistoryStore};
use pipeline::orchestrator::{PipelineOrchestrator, PipelineSettings};
use services::ServiceSet;
use session::SessionRegistry;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown signal, set by the signal handlers and polled by main.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting farmvoice-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    // Shared components, constructed once and injected everywhere: no
    // ambient global session or history state.
    let app_state = AppState::new(config.clone());
    let registry = Arc::new(SessionRegistry::new());
    let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
    let history_writer = HistoryWriter::spawn(store.clone(), config.history.queue_depth);
    let services = ServiceSet::from_config(&config)?;
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        services,
        store.clone(),
        history_writer,
        PipelineSettings::from_config(&config.pipeline)?,
    ));

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(orchestrator.clone()))
            .app_data(web::Data::new(store.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config))
                    .route("/sessions/{user_id}", web::get().to(handlers::list_sessions))
                    .route("/sessions/{user_id}", web::post().to(handlers::create_session))
                    .route(
                        "/sessions/{user_id}/active",
                        web::get().to(handlers::active_session),
                    )
                    .route(
                        "/sessions/{user_id}/switch",
                        web::post().to(handlers::switch_session),
                    )
                    .route(
                        "/sessions/{user_id}/{session_id}/turns",
                        web::get().to(handlers::session_turns),
                    ),
            )
            .route("/health", web::get().to(health::health_check))
            .route("/ws/{client_id}", web::get().to(websocket::chat_websocket))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Wait for either the server to finish or a shutdown signal
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

/// Initialize the tracing (logging) system.
///
/// `RUST_LOG` controls verbosity; the default keeps this crate at debug
/// and actix at info.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farmvoice_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Install SIGTERM/SIGINT handlers that set the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

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

/// Poll the shutdown flag without blocking other tasks.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
