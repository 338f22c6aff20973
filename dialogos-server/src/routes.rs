//! HTTP routes: the turn endpoint (streaming and blocking) and the
//! conversation CRUD surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use dialogos_core::prelude::*;

/// Shared server state
pub struct AppState {
    pub store: Arc<ConversationStore>,
    pub coordinator: Arc<StreamCoordinator>,
    pub limiter: Option<RateLimiter>,
    pub write_timeout: Duration,
}

impl AppState {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let store = Arc::new(ConversationStore::new());
        let gateway = GatewayFactory::create(&config.gateway)?;
        let coordinator = StreamCoordinator::new(
            store.clone(),
            gateway,
            ContextWindow::from_config(&config.context),
            config.turn.clone(),
        )
        .with_gateway_config(&config.gateway);

        Ok(Self {
            store,
            coordinator: Arc::new(coordinator),
            limiter: config.rate_limit.as_ref().map(RateLimiter::new),
            write_timeout: config.turn.write_timeout,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route(
            "/api/conversations",
            post(create_conversation).get(list_conversations),
        )
        .route(
            "/api/conversations/:id",
            get(get_conversation)
                .patch(update_conversation)
                .delete(delete_conversation),
        )
        .route("/api/conversations/:id/messages", get(list_messages))
        .route(
            "/api/conversations/:id/messages/:message_id",
            axum::routing::patch(edit_message).delete(delete_message),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(alias = "conversationId")]
    conversation_id: Option<String>,
    message: String,
    #[serde(default)]
    streaming: bool,
}

#[derive(Serialize)]
struct TurnResponse {
    message: Message,
    conversation: ConversationRef,
}

#[derive(Serialize)]
struct ConversationRef {
    id: String,
    updated_at: DateTime<Utc>,
    message_count: usize,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<ChatRequest>,
) -> std::result::Result<Response, ApiError> {
    if let Some(limiter) = &state.limiter {
        limiter.check(&addr.ip().to_string())?;
    }

    let mut turn_request = TurnRequest::new(request.message);
    if let Some(conversation_id) = &request.conversation_id {
        // Resolve before opening a stream so an unknown id fails with a
        // proper HTTP status instead of an in-stream error frame.
        state.store.get_conversation(conversation_id)?;
        turn_request = turn_request.on_conversation(conversation_id);
    }

    if !request.streaming {
        let outcome = state.coordinator.run_turn(turn_request).await?;
        return match outcome {
            TurnOutcome {
                assistant_message: Some(message),
                conversation_id,
                ..
            } => {
                let conversation = state.store.get_conversation(&conversation_id)?;
                let message_count = conversation.message_count();
                Ok(Json(TurnResponse {
                    message,
                    conversation: ConversationRef {
                        id: conversation.id,
                        updated_at: conversation.updated_at,
                        message_count,
                    },
                })
                .into_response())
            }
            TurnOutcome { error: Some(e), .. } => Err(ApiError(e)),
            _ => Err(ApiError(EngineError::Other(
                "model produced no response".to_string(),
            ))),
        };
    }

    let (mut transport, rx) = ChannelTransport::channel(64, state.write_timeout);
    let coordinator = state.coordinator.clone();
    let cancel = CancellationToken::new();

    tokio::spawn(async move {
        match coordinator
            .run_streaming_turn(turn_request, &mut transport, cancel)
            .await
        {
            Ok(outcome) => tracing::debug!(
                conversation = %outcome.conversation_id,
                state = ?outcome.state,
                "streaming turn finished"
            ),
            Err(e) => {
                // Rejected before any state mutation; the stream is already
                // open, so the error travels as the terminal frame.
                tracing::warn!(error = %e, "streaming turn rejected");
                let _ = transport.send_error(&e.to_string()).await;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|frame| Event::default().json_data(&frame));
    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}

#[derive(Debug, Deserialize)]
struct CreateConversationRequest {
    title: Option<String>,
    kind: Option<String>,
}

async fn create_conversation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateConversationRequest>,
) -> impl IntoResponse {
    let conversation = state.store.create_conversation(request.title, request.kind);
    (StatusCode::CREATED, Json(conversation))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Serialize)]
struct ListResponse {
    items: Vec<ConversationSummary>,
    total: usize,
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> std::result::Result<Json<ListResponse>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError(EngineError::InvalidRequest(
            "limit must be at least 1".to_string(),
        )));
    }

    let (items, total) = state.store.list_conversations(params.limit, params.offset);
    Ok(Json(ListResponse { items, total }))
}

async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Conversation>, ApiError> {
    Ok(Json(state.store.get_conversation(&id)?))
}

#[derive(Debug, Deserialize)]
struct UpdateConversationRequest {
    title: Option<String>,
    status: Option<ConversationStatus>,
}

async fn update_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateConversationRequest>,
) -> std::result::Result<Json<Conversation>, ApiError> {
    if let Some(title) = request.title {
        state.store.update_title(&id, title)?;
    }
    if let Some(status) = request.status {
        state.store.set_status(&id, status)?;
    }
    Ok(Json(state.store.get_conversation(&id)?))
}

async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    state.store.delete_conversation(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Vec<Message>>, ApiError> {
    Ok(Json(state.store.list_messages(&id)?))
}

#[derive(Debug, Deserialize)]
struct EditMessageRequest {
    content: String,
}

async fn edit_message(
    State(state): State<Arc<AppState>>,
    Path((id, message_id)): Path<(String, String)>,
    Json(request): Json<EditMessageRequest>,
) -> std::result::Result<Json<Message>, ApiError> {
    Ok(Json(state.store.edit_message(
        &id,
        &message_id,
        request.content,
    )?))
}

async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path((id, message_id)): Path<(String, String)>,
) -> std::result::Result<StatusCode, ApiError> {
    state.store.delete_message(&id, &message_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Engine error carried out as an HTTP response
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

fn error_code(err: &EngineError) -> &'static str {
    match err {
        EngineError::NotFound(_) => "not_found",
        EngineError::TurnInProgress(_) => "turn_in_progress",
        EngineError::RateLimited(_) => "rate_limited",
        EngineError::InvalidRequest(_) => "invalid_request",
        EngineError::ModelUnavailable(_) => "model_unavailable",
        EngineError::TransportClosed => "transport_closed",
        _ => "internal",
    }
}

fn error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::TurnInProgress(_) => StatusCode::CONFLICT,
        EngineError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        EngineError::ModelUnavailable(_) | EngineError::TransportClosed => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = error_status(&self.0);
        let body = Json(serde_json::json!({
            "error": {
                "code": error_code(&self.0),
                "message": self.0.to_string(),
            }
        }));
        (status, body).into_response()
    }
}
