//! HTTP gateway for Sleuth.
//!
//! Accepts a message plus an optional checkpoint id, drives one turn of the
//! search agent and relays its events to the client as Server-Sent Events.
//! Each event is a single `data: <json>` frame with no SSE event name, so
//! browser `EventSource.onmessage` handlers receive every record.
//!
//! Built on Axum.

pub mod turn;

pub use turn::drive_turn;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{
        Json,
        sse::{Event as SseEvent, Sse},
    },
    routing::{get, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sleuth_agent::TurnEngine;
use sleuth_checkpoint::CheckpointLocks;
use sleuth_config::{AppConfig, GatewayConfig};
use sleuth_core::checkpoint::{CheckpointId, CheckpointStore};
use sleuth_core::message::Message;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, AllowOrigin, CorsLayer};
use tracing::{info, warn};

/// Frames buffered between a running turn and the HTTP response body.
const FRAME_BUFFER: usize = 64;

/// Shared application state: the immutable runtime plus the checkpoint store.
pub struct GatewayState {
    pub config: AppConfig,
    pub engine: Arc<TurnEngine>,
    pub store: Arc<dyn CheckpointStore>,
    pub locks: Arc<CheckpointLocks>,
}

type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(config: AppConfig, engine: TurnEngine, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            config,
            engine: Arc::new(engine),
            store,
            locks: Arc::new(CheckpointLocks::new()),
        }
    }

    /// Build provider, capability registry, engine and checkpoint store once.
    pub async fn from_config(config: AppConfig) -> Result<Self, sleuth_core::Error> {
        let router = sleuth_providers::build_from_config(&config);
        let provider = router.default()?;
        let tools = Arc::new(sleuth_tools::default_registry(&config));
        let engine = TurnEngine::from_config(&config, provider, tools);
        let store = sleuth_checkpoint::build_from_config(&config.checkpoint).await?;

        info!(
            provider = engine.provider_name(),
            model = engine.model(),
            checkpoint = store.name(),
            "Runtime ready"
        );
        Ok(Self::new(config, engine, store))
    }
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.gateway);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/chat_stream/{message}", get(chat_stream_handler))
        .route("/chat/stream", post(chat_stream_post_handler))
        .route("/checkpoints/{id}", get(checkpoint_handler))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy from the configured origins; `*` allows any origin.
fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allowed_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = Arc::new(GatewayState::from_config(config).await?);
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

#[derive(Serialize)]
struct WelcomeResponse {
    message: &'static str,
    version: &'static str,
}

async fn root_handler() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to the Sleuth API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status) = match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };
    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

#[derive(Deserialize)]
struct StreamParams {
    checkpoint_id: Option<String>,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    checkpoint_id: Option<String>,
}

async fn chat_stream_handler(
    State(state): State<SharedState>,
    Path(message): Path<String>,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    open_stream(state, message, params.checkpoint_id).await
}

async fn chat_stream_post_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    open_stream(state, payload.message, payload.checkpoint_id).await
}

/// Validate the request, then spawn the turn and hand its frames to the response.
async fn open_stream(
    state: SharedState,
    message: String,
    checkpoint_id: Option<String>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message must not be empty"));
    }

    if let Err(e) = state.store.health_check().await {
        warn!(error = %e, "Refusing turn: checkpoint store not ready");
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("checkpoint store not ready: {e}"),
        ));
    }

    // An empty `?checkpoint_id=` starts a new conversation.
    let checkpoint_id = checkpoint_id
        .filter(|id| !id.trim().is_empty())
        .map(CheckpointId::from);

    info!(
        message_len = message.len(),
        resume = checkpoint_id.is_some(),
        "Chat stream request"
    );

    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    tokio::spawn(drive_turn(state, message, checkpoint_id, tx));

    let stream = ReceiverStream::new(rx).map(|frame| Ok(SseEvent::default().data(frame)));
    Ok(Sse::new(stream))
}

#[derive(Serialize)]
struct CheckpointResponse {
    checkpoint_id: String,
    messages: Vec<Message>,
}

async fn checkpoint_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<CheckpointResponse>, ApiError> {
    let checkpoint_id = CheckpointId::from(id);
    let messages = state.store.load(&checkpoint_id).await.map_err(|e| {
        warn!(checkpoint_id = %checkpoint_id, error = %e, "Failed to load checkpoint");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    if messages.is_empty() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("no conversation with checkpoint id '{checkpoint_id}'"),
        ));
    }

    Ok(Json(CheckpointResponse {
        checkpoint_id: checkpoint_id.to_string(),
        messages,
    }))
}

#[cfg(test)]
mod test_support;
