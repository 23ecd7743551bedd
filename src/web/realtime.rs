//! The per-observer real-time channel. One WebSocket per observer; the
//! server pushes change events as JSON text frames and ignores anything the
//! client sends. Connection teardown unsubscribes the observer.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::hub::EventHub;
use crate::state::AppState;

pub async fn realtime(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_observer(socket, state.hub.clone()))
}

async fn handle_observer(socket: WebSocket, hub: Arc<EventHub>) {
    let (id, mut events) = hub.subscribe().await;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(err) => {
                        debug!(observer = id, error = %err, "dropping unencodable event");
                        continue;
                    }
                };
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            frame = stream.next() => {
                // No client->server messages are defined on this channel.
                match frame {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    hub.unsubscribe(id).await;
    debug!(observer = id, "realtime connection closed");
}
