//! Notification service routes: the WebSocket fan-out endpoint and health.

use std::sync::Arc;

use axum::Json;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::events::{Broadcaster, ListenerState, NotificationListener};

const SOURCE: &str = "infra::http::notifications";

#[derive(Clone)]
pub struct NotificationsState {
    pub broadcaster: Broadcaster,
    pub listener: Arc<NotificationListener>,
}

#[derive(Debug, Serialize)]
struct NotificationHealth {
    online: bool,
    service: &'static str,
    connections: usize,
    listener: ListenerState,
}

pub async fn health(State(state): State<NotificationsState>) -> impl IntoResponse {
    Json(NotificationHealth {
        online: true,
        service: "notification-service",
        connections: state.broadcaster.connection_count(),
        listener: state.listener.state(),
    })
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<NotificationsState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state.broadcaster))
}

async fn serve_socket(socket: WebSocket, broadcaster: Broadcaster) {
    let mut subscription = broadcaster.attach();
    let connection_id = subscription.id();
    info!(
        target = SOURCE,
        connection_id = %connection_id,
        connections = broadcaster.connection_count(),
        "client connected"
    );

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            notification = subscription.recv() => {
                let Some(notification) = notification else {
                    break;
                };
                let frame = match serde_json::to_string(&notification) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(target = SOURCE, error = %err, "failed to encode notification");
                        continue;
                    }
                };
                if let Err(err) = sender.send(Message::Text(frame.into())).await {
                    debug!(
                        target = SOURCE,
                        connection_id = %connection_id,
                        error = %err,
                        "send failed; closing connection"
                    );
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(
                        target = SOURCE,
                        connection_id = %connection_id,
                        error = %err,
                        "receive failed; closing connection"
                    );
                    break;
                }
            },
        }
    }

    drop(subscription);
    info!(
        target = SOURCE,
        connection_id = %connection_id,
        connections = broadcaster.connection_count(),
        "client disconnected"
    );
}
