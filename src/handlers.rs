//! HTTP and WebSocket endpoints of the connector.
//!
//! REST routes bind request DTOs to the tokens service; transaction
//! submissions answer `202 Accepted` with the gateway correlation id, while
//! pool creation against an existing contract answers synchronously. The
//! WebSocket route hands sockets to the event stream proxy: clients send
//! `{"type":"start","namespace":…}` and acknowledge each delivered batch
//! with `{"event":"ack","data":{"id":…}}`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use tokens_types::tokens::{TokenApproval, TokenBalanceQuery, TokenBurn, TokenMint, TokenPool, TokenPoolActivate, TokenTransfer};

use crate::blockchain::{BlockchainConnector, RequestContext};
use crate::error::ApiError;
use crate::proxy::EventStreamProxy;
use crate::service::{CreatePoolResponse, TokensService};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TokensService>,
    pub proxy: Arc<EventStreamProxy>,
    pub blockchain: Arc<BlockchainConnector>,
    pub passthrough_headers: Vec<String>,
    pub topic: String,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/createpool", post(post_create_pool))
        .route("/activatepool", post(post_activate_pool))
        .route("/mint", post(post_mint))
        .route("/transfer", post(post_transfer))
        .route("/burn", post(post_burn))
        .route("/approval", post(post_approval))
        .route("/balance", get(get_balance))
        .route("/receipt/{id}", get(get_receipt))
        .route("/health/liveness", get(get_liveness))
        .route("/health/readiness", get(get_readiness))
        .route("/api/ws", get(get_ws))
}

/// Builds the gateway-bound request context from inbound headers: the
/// correlation id plus any operator-configured passthrough headers.
fn request_context(state: &AppState, headers: &HeaderMap) -> RequestContext {
    let id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut passthrough = Vec::new();
    for name in &state.passthrough_headers {
        if let Some(value) = headers.get(name.as_str()).and_then(|value| value.to_str().ok()) {
            passthrough.push((name.clone(), value.to_string()));
        }
    }
    RequestContext {
        id,
        headers: passthrough,
    }
}

#[instrument(skip_all)]
async fn post_create_pool(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(dto): Json<TokenPool>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = request_context(&state, &headers);
    match state.service.create_pool(&ctx, &dto).await? {
        CreatePoolResponse::Created(event) => Ok((StatusCode::OK, Json(serde_json::json!(event)))),
        CreatePoolResponse::Pending(response) => {
            Ok((StatusCode::ACCEPTED, Json(serde_json::json!(response))))
        }
    }
}

#[instrument(skip_all)]
async fn post_activate_pool(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(dto): Json<TokenPoolActivate>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = request_context(&state, &headers);
    let event = state.service.activate_pool(&ctx, &dto).await?;
    Ok((StatusCode::OK, Json(event)))
}

#[instrument(skip_all)]
async fn post_mint(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(dto): Json<TokenMint>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = request_context(&state, &headers);
    let response = state.service.mint(&ctx, &dto).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

#[instrument(skip_all)]
async fn post_transfer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(dto): Json<TokenTransfer>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = request_context(&state, &headers);
    let response = state.service.transfer(&ctx, &dto).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

#[instrument(skip_all)]
async fn post_burn(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(dto): Json<TokenBurn>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = request_context(&state, &headers);
    let response = state.service.burn(&ctx, &dto).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

#[instrument(skip_all)]
async fn post_approval(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(dto): Json<TokenApproval>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = request_context(&state, &headers);
    let response = state.service.approval(&ctx, &dto).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

#[instrument(skip_all)]
async fn get_balance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TokenBalanceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = request_context(&state, &headers);
    let balance = state.service.balance(&ctx, &query).await?;
    Ok((StatusCode::OK, Json(balance)))
}

#[instrument(skip_all)]
async fn get_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = request_context(&state, &headers);
    let receipt = state.service.receipt(&ctx, &id).await?;
    Ok((StatusCode::OK, Json(receipt)))
}

#[instrument(skip_all)]
async fn get_liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness requires the RPC gateway to be reachable.
#[instrument(skip_all)]
async fn get_readiness(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.blockchain.ping().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(error) => {
            tracing::warn!(%error, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "gateway unreachable")
        }
    }
}

#[instrument(skip_all)]
async fn get_ws(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: Arc<AppState>, socket: WebSocket) {
    let client = state.proxy.register_client().await;
    let client_id = client.id;
    let mut frames = client.receiver;
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        if let Message::Text(text) = message {
            handle_client_message(&state, client_id, text.as_str()).await;
        }
    }

    state.proxy.disconnect(client_id).await;
    writer.abort();
}

async fn handle_client_message(state: &AppState, client_id: u64, text: &str) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(error) => {
            tracing::debug!(%error, "Ignoring unparseable client frame");
            return;
        }
    };
    if value.get("type").and_then(Value::as_str) == Some("start") {
        let namespace = value
            .get("namespace")
            .and_then(Value::as_str)
            .unwrap_or(&state.topic);
        state.proxy.start(client_id, namespace).await;
    } else if value.get("event").and_then(Value::as_str) == Some("ack") {
        if let Some(id) = value.pointer("/data/id").and_then(Value::as_str) {
            state.proxy.ack(client_id, id).await;
        }
    } else {
        tracing::debug!("Ignoring unrecognized client frame");
    }
}
