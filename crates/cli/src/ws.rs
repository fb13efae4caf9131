//! Viewer WebSocket endpoint
//!
//! Each connection gets a queue in the broadcast hub. Inbound text frames
//! are decoded as viewer commands and forwarded to the engine.

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use rendermon_core::{ClientMessage, ServerMessage};
use std::sync::Arc;

use crate::engine::EngineHandle;
use crate::hub::Outbound;
use crate::state::AppState;

/// HTTP handler that upgrades the connection to a viewer WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.engine))
}

/// Manage a single viewer connection after upgrade.
///
/// The engine registers the connection and queues its `initialState`
/// before anything else can be broadcast to it. A sender task drains the
/// queue into the socket while this task handles inbound commands.
async fn handle_socket(socket: WebSocket, engine: EngineHandle) {
    let conn_id = uuid::Uuid::new_v4().to_string();

    let mut rx = match engine.connect(conn_id.clone()).await {
        Ok(rx) => rx,
        Err(e) => {
            tracing::warn!(conn_id = %conn_id, error = %e, "Rejecting viewer connection");
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            let (msg, last) = match out {
                Outbound::Text(text) => (Message::Text(text.to_string().into()), false),
                Outbound::Ping => (Message::Ping(Bytes::new()), false),
                Outbound::Close => (Message::Close(None), true),
            };
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if last {
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => dispatch(&engine, &conn_id, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    engine.hub().remove(&conn_id);
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Viewer disconnected");
}

async fn dispatch(engine: &EngineHandle, conn_id: &str, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(conn_id, error = %e, "Unrecognised viewer message");
            reply_error(engine, conn_id, format!("Invalid message: {e}"));
            return;
        }
    };

    let result = match message {
        ClientMessage::SetTotalFrames { total_frames } => engine
            .set_total_frames(total_frames, Some(conn_id.to_string()))
            .await
            .map(|_| ()),
        ClientMessage::RequestState => engine.request_state(conn_id.to_string()).await,
        ClientMessage::ResetFrames => engine.reset().await.map(|_| ()),
    };

    // Validation failures were already reported to this viewer by the engine
    if let Err(e) = result {
        tracing::debug!(conn_id, error = %e, "Viewer command failed");
    }
}

fn reply_error(engine: &EngineHandle, conn_id: &str, message: String) {
    let msg = ServerMessage::Error { message };
    if let Ok(text) = serde_json::to_string(&msg) {
        engine.hub().send_to(conn_id, Arc::from(text));
    }
}
