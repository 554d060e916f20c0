use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use tracing::{error, info, warn};

use crate::error::DeliveryError;
use crate::events::{ClientEvent, ServerEvent};
use crate::presence::ConnectionHandle;
use crate::router::DeliveryRouter;

/// Serve a single WebSocket connection: authenticate, register presence,
/// pump events through the router, tear down on close.
///
/// Router operations are awaited inline before the next frame is read, so a
/// disconnect arriving mid-operation never aborts an in-flight persistence
/// step; only the delivery back to this connection becomes moot.
pub async fn handle_connection(ws_stream: WebSocketStream<TcpStream>, router: Arc<DeliveryRouter>) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // First frame must be `connect`; everything before it is discarded.
    let user_id = match wait_for_connect(&mut ws_receiver).await {
        Some(id) => id,
        None => {
            warn!("Connection closed before authentication");
            return;
        }
    };

    info!("User connected: {}", user_id);

    // Channel feeding this connection's writer task.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handle = router.presence().register(&user_id, tx);

    let auth_response = ServerEvent::AuthResponse {
        success: true,
        message: "connected".to_string(),
    };
    if let Some(frame) = auth_response.encode() {
        if let Err(e) = ws_sender.send(Message::Text(frame.into())).await {
            error!("Failed to send auth response to {}: {}", user_id, e);
        }
    }

    // Forward queued frames to the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            res = ws_receiver.next() => {
                match res {
                    Some(Ok(Message::Text(text))) => {
                        handle_event(&text, &handle, &router).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("User {} sent close frame", handle.user_id());
                        break;
                    }
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error for user {}: {}", handle.user_id(), e);
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended for user {}", handle.user_id());
                        break;
                    }
                    _ => {}
                }
            }
            _ = &mut send_task => {
                info!("Writer finished for user {} (likely connection lost)", handle.user_id());
                break;
            }
        }
    }

    send_task.abort();
    router.disconnect(&handle);

    info!("User disconnected: {}", user_id);
}

/// Wait for the `connect` frame from a new connection. Gives the client 10
/// seconds to authenticate; when `RIALTO_ACCESS_TOKEN` is set, the frame
/// must carry the matching token.
async fn wait_for_connect(
    receiver: &mut futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
) -> Option<String> {
    let timeout = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        while let Some(result) = receiver.next().await {
            if let Ok(Message::Text(text)) = result {
                match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(ClientEvent::Connect { user_id, token }) => {
                        if let Ok(expected_token) = std::env::var("RIALTO_ACCESS_TOKEN") {
                            if !expected_token.is_empty()
                                && token.as_deref() != Some(expected_token.as_str())
                            {
                                warn!("Authentication failed for {}: bad token", user_id);
                                return None;
                            }
                        }
                        return Some(user_id);
                    }
                    Ok(_) => {
                        // Pre-auth frames other than connect are dropped.
                    }
                    Err(e) => {
                        warn!("Failed to parse connect frame: {}", e);
                    }
                }
            }
        }
        None
    });

    match timeout.await {
        Ok(result) => result,
        Err(_) => {
            warn!("Authentication timeout");
            None
        }
    }
}

/// Dispatch one inbound event from an authenticated connection. Failures are
/// returned to this connection only; they never reach other participants and
/// never abort the connection.
async fn handle_event(text: &str, handle: &ConnectionHandle, router: &DeliveryRouter) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Failed to parse event from {}: {}", handle.user_id(), e);
            let error = ServerEvent::Error {
                message: "malformed event".to_string(),
            };
            if let Some(frame) = error.encode() {
                handle.send(&frame);
            }
            return;
        }
    };

    match event {
        ClientEvent::JoinChat { chat_id } => router.join(handle, &chat_id),
        ClientEvent::LeaveChat { chat_id } => router.leave(handle, &chat_id),
        ClientEvent::SendMessage { chat_id, content } => {
            if let Err(err) = router.send_message(handle, &chat_id, content).await {
                warn!(
                    "send_message from {} on chat {} failed: {}",
                    handle.user_id(),
                    chat_id,
                    err
                );
                send_failure(handle, &chat_id, &err);
            }
        }
        ClientEvent::Typing { chat_id } => router.typing(handle, &chat_id),
        ClientEvent::StopTyping { chat_id } => router.stop_typing(handle, &chat_id),
        ClientEvent::MarkRead { chat_id } => {
            if let Err(err) = router.mark_read(handle, &chat_id).await {
                warn!(
                    "mark_read from {} on chat {} failed: {}",
                    handle.user_id(),
                    chat_id,
                    err
                );
                send_failure(handle, &chat_id, &err);
            }
        }
        // Already authenticated; a repeated connect frame carries nothing new.
        ClientEvent::Connect { .. } => {}
    }
}

fn send_failure(handle: &ConnectionHandle, chat_id: &str, err: &DeliveryError) {
    let event = ServerEvent::SendFailed {
        chat_id: chat_id.to_string(),
        reason: err.reason().to_string(),
    };
    if let Some(frame) = event.encode() {
        handle.send(&frame);
    }
}
