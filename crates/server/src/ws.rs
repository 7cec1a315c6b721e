//! Client stream socket
//!
//! `GET /ws` upgrades to a WebSocket. The socket task drains the
//! session's frame channel into the socket; client-to-server messages
//! are ignored. A send failure or close tears down only this session.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info};

use crate::AppState;

/// Maximum frame size in either direction
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// GET /ws
pub async fn upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.max_message_size(MAX_FRAME_BYTES)
        .max_frame_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| client_stream(state, socket))
}

async fn client_stream(state: Arc<AppState>, socket: WebSocket) {
    let (session, mut frames) = state.broadcaster.sessions().register();
    let session_id = session.id();
    info!(session_id, "stream client connected");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = frames.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = sink.send(Message::Text(frame.into())).await {
                            debug!(session_id, error = %e, "socket send failed");
                            break;
                        }
                    }
                    // Channel closed: the broadcaster evicted this session.
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Client-to-server messages are ignored by the core.
                    }
                    Some(Err(e)) => {
                        debug!(session_id, error = %e, "socket receive failed");
                        break;
                    }
                }
            }
        }
    }

    state.broadcaster.sessions().unregister(session_id);
    info!(session_id, "stream client disconnected");
}
