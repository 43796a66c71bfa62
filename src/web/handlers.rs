use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{Json, Response},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::{ApiResponse, AppState, HttpError};
use crate::broadcaster::{Broadcaster, ChannelObserver};
use crate::models::{generate_session_id, MonitoredProduct, PriceChangeRecord, SessionStatus};
use crate::utils::error::AppError;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    #[validate(nested)]
    pub products: Vec<MonitoredProduct>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponse {
    pub session_id: String,
    pub updated_products: Vec<MonitoredProduct>,
    pub price_changes: Vec<PriceChangeRecord>,
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "price-sentinel"
    }))
}

/// Runs a monitoring pass and answers once it has finished.
pub async fn start_scrape(
    State(state): State<AppState>,
    Json(request): Json<ScrapeRequest>,
) -> Result<Json<ApiResponse<ScrapeResponse>>, HttpError> {
    request.validate().map_err(AppError::from)?;

    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(generate_session_id);

    tracing::info!(session_id = %session_id, products = request.products.len(), "Scrape requested");

    let outcome = state.service.run_session(&request.products, &session_id).await?;

    let meta = serde_json::json!({
        "total": request.products.len(),
        "failed": outcome.failed,
    });
    Ok(Json(ApiResponse::success_with_meta(
        ScrapeResponse {
            session_id,
            updated_products: outcome.updated_products,
            price_changes: outcome.price_changes,
        },
        meta,
    )))
}

/// Raw session status, `{}` for unknown or expired sessions.
pub async fn scrape_status(State(state): State<AppState>, Path(session_id): Path<String>) -> Json<SessionStatus> {
    Json(state.service.store().get(&session_id).await)
}

pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<MonitoredProduct>>>, HttpError> {
    let catalog = state
        .service
        .monitor()
        .catalog()
        .ok_or_else(|| HttpError::unavailable("No product catalog configured"))?;

    let products = catalog.list_products().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to list products");
        HttpError::from(e)
    })?;

    Ok(Json(ApiResponse::success(products)))
}

pub async fn subscribe(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, receiver) = socket.split();
    relay_events(sender, receiver, state.service.broadcaster().clone()).await;
}

/// Relays broadcast events to one connection until either side closes. The
/// observer is registered for exactly as long as the connection lives.
async fn relay_events<S, R, E>(mut sender: S, mut receiver: R, broadcaster: Broadcaster)
where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Send + 'static,
{
    let (observer, mut events) = ChannelObserver::pair();
    let observer_id = broadcaster.register(Arc::new(observer)).await;

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = events.recv().await {
            if sender.send(Message::Text(message)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    broadcaster.unregister(observer_id).await;
    tracing::debug!(observer_id = %observer_id, "WebSocket observer disconnected");
}
