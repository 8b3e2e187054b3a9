#![forbid(unsafe_code)]
//! rollcalld: attendance daemon.
//!
//! Exposes:
//! - `POST /process-image`: recognize faces in a frame and mark attendance
//! - `GET /get-attendance`: every attendance record, newest first
//! - `GET /export-attendance`: the same records as a CSV download
//! - `GET /live`: process liveness

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum::error_handling::HandleErrorLayer;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, Request};
use axum::routing::{get, post};
use axum::Router;
use rollcall_core::{EuclideanMatcher, FaceExtractor, Gallery, OnnxExtractor};
use rollcall_ledger::{Ledger, LedgerOptions};
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod errors;
mod handlers;
mod models;
mod processor;
mod state;

use crate::config::Config;
use crate::engine::spawn_engine;
use crate::errors::handle_middleware_error;
use crate::handlers::{export_attendance, get_attendance, live, process_image};
use crate::processor::FrameProcessor;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("invalid configuration")?;

    let gallery = Gallery::load(&config.gallery_path).with_context(|| {
        format!("failed to load gallery from {}", config.gallery_path.display())
    })?;
    let extractor = OnnxExtractor::load(&config.model_dir).with_context(|| {
        format!("failed to load face models from {}", config.model_dir.display())
    })?;
    if let (Some(stored), Some(produced)) = (gallery.dimension(), extractor.embedding_dim()) {
        if stored != produced {
            bail!(
                "gallery embeddings have {stored} dimensions but the extractor produces {produced}"
            );
        }
    }

    let gallery_entries = gallery.len();
    let engine = spawn_engine(Box::new(extractor)).context("failed to spawn engine thread")?;

    let ledger = Ledger::open(
        &config.db_path,
        LedgerOptions {
            day_zone: config.day_offset,
            max_attempts: config.storage_attempts,
            ..LedgerOptions::default()
        },
    )
    .await
    .with_context(|| format!("failed to open ledger at {}", config.db_path.display()))?;

    let processor = FrameProcessor::new(Arc::new(gallery), EuclideanMatcher, config.tolerance);
    let state = AppState::new(engine, ledger, processor);
    let app = build_app(state, &config);

    let bind = config.bind;
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind server socket on {bind}"))?;

    tracing::info!(
        %bind,
        db = %config.db_path.display(),
        gallery_entries,
        tolerance = config.tolerance,
        day_offset = %config.day_offset,
        timeout_ms = config.request_timeout.as_millis() as u64,
        max_body_bytes = config.max_body_bytes,
        "rollcalld started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited unexpectedly")?;

    tracing::info!("rollcalld stopped");
    Ok(())
}

pub(crate) fn build_app(state: AppState, config: &Config) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(
            request_id_header.clone(),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(HandleErrorLayer::new(handle_middleware_error))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |request: &Request<_>| {
                    let request_id = request
                        .headers()
                        .get(&request_id_header)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id
                    )
                })
                .on_response(DefaultOnResponse::new().latency_unit(LatencyUnit::Millis)),
        );

    Router::new()
        .route("/live", get(live))
        .route("/process-image", post(process_image))
        .route("/get-attendance", get(get_attendance))
        .route("/export-attendance", get(export_attendance))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(middleware)
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(error) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("failed to initialize tracing subscriber: {error}");
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(error) => tracing::error!(%error, "failed to install Ctrl-C handler"),
    }
}
