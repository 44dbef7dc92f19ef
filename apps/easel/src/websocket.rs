//! Session lifecycle: one WebSocket connection bound to the router.
//!
//! Outbound frames flow through an mpsc channel drained by a writer task.
//! Inbound frames are processed one at a time per connection, which keeps
//! acknowledgment order predictable and guarantees a chunked transfer is
//! never interleaved with other outbound frames. A failure while handling
//! one frame becomes an `error` frame; the connection lives on.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use easel_core::ServerFrame;
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::rate_limit::RateLimiter;
use crate::router::CanvasRouter;

/// Shared state for the `/ws` route.
#[derive(Clone)]
pub struct WsState {
    pub router: Arc<CanvasRouter>,
    pub config: Config,
}

impl WsState {
    pub fn new(router: Arc<CanvasRouter>, config: Config) -> Self {
        Self { router, config }
    }
}

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    // Writer task: the only place that touches the sink.
    let writer_connection = connection_id;
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    error!(connection = %writer_connection, error = %err, "failed to encode frame");
                }
            }
        }
        debug!(connection = %writer_connection, "writer task finished");
    });

    debug!(connection = %connection_id, "websocket connected");
    counter!("easel_connections_total", 1);

    let mut limiter = RateLimiter::new(state.config.rate_limit, state.config.rate_window);

    while let Some(next) = receiver.next().await {
        let msg = match next {
            Ok(msg) => msg,
            Err(err) => {
                warn!(connection = %connection_id, error = %err, "websocket error");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                process_frame(text, &state, &mut limiter, &tx, connection_id).await;
            }
            Message::Binary(data) => {
                // Some clients ship JSON in binary frames; accept those.
                match String::from_utf8(data) {
                    Ok(text) => {
                        process_frame(text, &state, &mut limiter, &tx, connection_id).await;
                    }
                    Err(_) => {
                        debug!(connection = %connection_id, "ignoring non-UTF8 binary frame");
                    }
                }
            }
            Message::Close(_) => {
                debug!(connection = %connection_id, "client closed websocket");
                break;
            }
            // Ping/Pong are handled by the transport layer.
            _ => {}
        }
    }

    writer.abort();
    debug!(connection = %connection_id, "websocket disconnected");
}

async fn process_frame(
    text: String,
    state: &WsState,
    limiter: &mut RateLimiter,
    tx: &mpsc::UnboundedSender<ServerFrame>,
    connection_id: Uuid,
) {
    if !limiter.admit(Instant::now()) {
        counter!("easel_rate_limited_total", 1);
        let _ = tx.send(ServerFrame::Error {
            message: "rate limit exceeded, slow down".to_string(),
        });
        return;
    }

    // Run the handler on its own task so a panic in one frame cannot take
    // the connection down with it.
    let router = Arc::clone(&state.router);
    let frames = match tokio::spawn(async move { router.handle_frame(&text).await }).await {
        Ok(frames) => frames,
        Err(err) => {
            error!(connection = %connection_id, error = %err, "frame handler panicked");
            counter!("easel_frame_errors_total", 1, "kind" => "internal");
            vec![ServerFrame::Error {
                message: "internal error".to_string(),
            }]
        }
    };

    let mut sent_any = false;
    for frame in frames {
        let paced = matches!(frame, ServerFrame::CanvasDataChunk { .. });
        if paced && sent_any {
            tokio::time::sleep(state.config.chunk_delay).await;
        }
        if tx.send(frame).is_err() {
            return;
        }
        sent_any = true;
    }
}
