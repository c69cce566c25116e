pub mod session;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::registry::{Outbound, CLOSE_USERNAME_TAKEN};
use crate::state::AppState;
use session::{Session, SessionError};

/// WebSocket upgrade handler for `/ws/{username}`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(username): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    tracing::info!(username = %username, "WebSocket connection request");

    ws.on_upgrade(move |socket| handle_socket(socket, username, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, username: String, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Outbound>();

    // Writer task owns the sink; everything else talks to it through the queue
    let mut writer = tokio::spawn(writer_task(sender, rx));

    let mut session = Session::new(state.registry.clone(), username, tx);
    if let Err(e) = session.open().await {
        tracing::warn!(username = %session.username(), error = %e, "Refusing connection");
        let _ = session.send(Outbound::Close {
            code: CLOSE_USERNAME_TAKEN,
            reason: "username already in use".to_string(),
        });
        drop(session);
        let _ = writer.await;
        return;
    }

    let mut writer_done = false;
    loop {
        let frame = tokio::select! {
            _ = &mut writer => {
                tracing::debug!(username = %session.username(), "Writer finished");
                writer_done = true;
                break;
            }
            frame = next_frame(&mut receiver, state.idle_timeout) => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                tracing::debug!(username = %session.username(), "Received message: {}", text.as_str());

                match session.on_text(text.as_str()).await {
                    Ok(_) => {}
                    Err(SessionError::Registry(e)) => {
                        tracing::info!(error = %e, "Peer vanished while sending");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Session rejected message");
                        break;
                    }
                }
            }
            Some(Ok(Message::Ping(data))) => {
                if session.send(Outbound::Pong(data)).is_err() {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) => {
                tracing::info!(username = %session.username(), "WebSocket closed");
                break;
            }
            // Text-only chat
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(username = %session.username(), "WebSocket error: {}", e);
                break;
            }
            None => break,
        }
    }

    session.close().await;
    tracing::info!(
        username = %session.username(),
        connection_id = %session.connection_id(),
        "WebSocket connection closed"
    );

    // Last sender goes with the session, which lets the writer drain and close the sink
    drop(session);
    if !writer_done {
        let _ = writer.await;
    }
}

/// Next frame from the peer, or None once the stream ends or the idle limit passes
async fn next_frame(
    receiver: &mut SplitStream<WebSocket>,
    idle_timeout: Option<Duration>,
) -> Option<Result<Message, axum::Error>> {
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, receiver.next()).await {
            Ok(frame) => frame,
            Err(_) => {
                tracing::info!(?limit, "Closing idle connection");
                None
            }
        },
        None => receiver.next().await,
    }
}

/// Forward queued frames to the socket until the queue closes or a close frame is sent
async fn writer_task(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(outbound) = rx.recv().await {
        let (message, last) = match outbound {
            Outbound::Text(text) => (Message::Text(text.into()), false),
            Outbound::Pong(data) => (Message::Pong(data), false),
            Outbound::Close { code, reason } => (
                Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })),
                true,
            ),
        };

        if sender.send(message).await.is_err() {
            tracing::debug!("Failed to write to socket");
            return;
        }
        if last {
            return;
        }
    }

    let _ = sender.close().await;
}
