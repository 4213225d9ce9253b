//! Observer WebSocket endpoint
//!
//! GET /ws upgrades and registers the socket with the broadcast hub. The
//! server only pushes; inbound text is ignored. The connection is
//! unregistered once the socket ends or the service shuts down.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::services::{ObserverSink, SinkError};
use crate::AppState;

/// Hub-facing half of one observer socket
pub struct WsObserver {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    open: AtomicBool,
}

impl WsObserver {
    fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            open: AtomicBool::new(true),
        }
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }
}

#[async_trait]
impl ObserverSink for WsObserver {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn send_text(&self, message: Arc<str>) -> Result<(), SinkError> {
        if !self.is_open() {
            return Err(SinkError::Closed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(message.to_string()))
            .await
            .map_err(|e| {
                self.mark_closed();
                SinkError::Transport(e.to_string())
            })
    }
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, mut stream) = socket.split();
    let observer = Arc::new(WsObserver::new(sink));
    let id = state.hub.register(observer.clone());

    let shutdown = state.queue.shutdown_token();

    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = stream.next() => msg,
        };
        match msg {
            None | Some(Ok(Message::Close(_))) => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(connection_id = id, error = %e, "Observer socket error");
                break;
            }
        }
    }

    observer.mark_closed();
    state.hub.unregister(id);
}

/// Build WebSocket routes
pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}
