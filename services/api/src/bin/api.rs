//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{LoggingCodeDelivery, SimulatedSubmissionBackend, SystemClock},
    config::Config,
    error::ApiError,
    web::{
        rest::{
            advance_stage_handler, change_email_handler, checklist_audio_handler,
            checklist_view_handler, clip_accept_handler, clip_retake_handler,
            document_advance_handler, document_retreat_handler, document_scroll_handler,
            document_view_handler, export_handler, landing_handler, recording_start_handler,
            recording_stop_handler, resend_challenge_handler, send_challenge_handler,
            signature_acknowledge_handler, signature_clear_handler, signature_stroke_handler,
            signature_view_handler, submit_handler, verify_code_handler,
        },
        ApiDoc, AppState,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize Service Adapters ---
    let clock = Arc::new(SystemClock);
    let delivery = Arc::new(LoggingCodeDelivery::new(Duration::from_millis(
        config.code_delivery_latency_ms,
    )));
    let submission = Arc::new(SimulatedSubmissionBackend::new(Duration::from_millis(
        config.submission_latency_ms,
    )));

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        config.clone(),
        clock,
        delivery,
        submission,
    ));

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN: {}", e)))?,
        )
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 4. Create the Web Router ---
    let api_router = Router::new()
        .route("/consent/{token}", get(landing_handler))
        .route("/consent/{token}/advance", post(advance_stage_handler))
        .route("/consent/{token}/verify/send", post(send_challenge_handler))
        .route("/consent/{token}/verify/code", post(verify_code_handler))
        .route(
            "/consent/{token}/verify/resend",
            post(resend_challenge_handler),
        )
        .route(
            "/consent/{token}/verify/change-email",
            post(change_email_handler),
        )
        .route("/consent/{token}/document", get(document_view_handler))
        .route(
            "/consent/{token}/document/scroll",
            post(document_scroll_handler),
        )
        .route(
            "/consent/{token}/document/advance",
            post(document_advance_handler),
        )
        .route(
            "/consent/{token}/document/retreat",
            post(document_retreat_handler),
        )
        .route("/consent/{token}/checklist", get(checklist_view_handler))
        .route(
            "/consent/{token}/checklist/{item_id}/audio",
            post(checklist_audio_handler),
        )
        .route(
            "/consent/{token}/checklist/{item_id}/recording/start",
            post(recording_start_handler),
        )
        .route(
            "/consent/{token}/checklist/{item_id}/recording/stop",
            post(recording_stop_handler),
        )
        .route(
            "/consent/{token}/checklist/{item_id}/clip/accept",
            post(clip_accept_handler),
        )
        .route(
            "/consent/{token}/checklist/{item_id}/clip/retake",
            post(clip_retake_handler),
        )
        .route("/consent/{token}/signature", get(signature_view_handler))
        .route(
            "/consent/{token}/signature/stroke",
            post(signature_stroke_handler),
        )
        .route(
            "/consent/{token}/signature/clear",
            post(signature_clear_handler),
        )
        .route(
            "/consent/{token}/signature/acknowledge",
            post(signature_acknowledge_handler),
        )
        .route("/consent/{token}/signature/submit", post(submit_handler))
        .route("/consent/{token}/export", get(export_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
