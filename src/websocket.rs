//! WebSocket streaming of live readings.
//!
//! Each connection registers one bridge subscriber and forwards its events as
//! JSON text frames. Clients may send servo commands on the same socket. The
//! subscriber is removed when the socket closes.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State as AxumState, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::bridge::{BridgeEvent, ConnectionState};
use crate::codec::Reading;
use crate::rest_api::{blocking, RestContext};

/// Messages sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Greeting sent once per connection
    Connected { msg: String },
    /// One sensor reading
    Sensor {
        dist: u32,
        mov: u8,
        seq: u64,
        timestamp: String,
    },
    /// Connection state change
    State {
        state: ConnectionState,
        detail: String,
    },
    /// A command was written to the device
    Ack { angle: i64, bytes_written: usize },
    /// Error notification
    Error { kind: String, message: String },
}

impl From<&Reading> for WsMessage {
    fn from(reading: &Reading) -> Self {
        Self::Sensor {
            dist: reading.distance_cm,
            mov: u8::from(reading.motion_detected),
            seq: reading.sequence,
            timestamp: reading.received_at.to_rfc3339(),
        }
    }
}

impl From<BridgeEvent> for WsMessage {
    fn from(event: BridgeEvent) -> Self {
        match event {
            BridgeEvent::Reading(reading) => Self::from(&reading),
            BridgeEvent::State(change) => Self::State {
                state: change.state,
                detail: change.detail,
            },
        }
    }
}

/// Incoming commands from clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsCommand {
    /// Move the servo
    Command { angle: i64 },
}

type WsSender = SplitSink<WebSocket, Message>;

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    AxumState(ctx): AxumState<RestContext>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: RestContext) {
    let (mut sender, mut receiver) = socket.split();
    let client_id = uuid::Uuid::new_v4();
    let mut subscription = ctx.bridge.subscribe();
    let mut shutdown = ctx.shutdown_requested();

    info!("WebSocket client connected: {} ({})", client_id, subscription.id());

    let greeting = [
        WsMessage::Connected { msg: "OK".to_string() },
        WsMessage::State {
            state: ctx.bridge.current_state(),
            detail: "current state".to_string(),
        },
    ];
    for msg in &greeting {
        if let Err(e) = send_message(&mut sender, msg).await {
            error!("Failed to greet {}: {}", client_id, e);
            ctx.bridge.unsubscribe(subscription.id());
            return;
        }
    }

    while !*shutdown.borrow() {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_message(text.as_str(), &ctx).await;
                        if let Err(e) = send_message(&mut sender, &reply).await {
                            error!("Failed to reply to {}: {}", client_id, e);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket client {} disconnected", client_id);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            error!("Failed to send pong to {}: {}", client_id, e);
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        // Ignore other message types (Binary, Pong)
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error for {}: {}", client_id, e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended for {}", client_id);
                        break;
                    }
                }
            }

            event = subscription.recv() => {
                let Some(event) = event else {
                    debug!("Subscription ended for {}", client_id);
                    break;
                };
                if let Err(e) = send_message(&mut sender, &WsMessage::from(event)).await {
                    error!("Failed to forward event to {}: {}", client_id, e);
                    break;
                }
            }
        }
    }

    ctx.bridge.unsubscribe(subscription.id());
    info!("WebSocket handler finished for {}", client_id);
}

/// Turn one client frame into the reply to send back.
async fn handle_client_message(text: &str, ctx: &RestContext) -> WsMessage {
    let command: WsCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            return WsMessage::Error {
                kind: "BadRequest".to_string(),
                message: e.to_string(),
            }
        }
    };

    match command {
        WsCommand::Command { angle } => {
            match blocking(&ctx.bridge, move |bridge| bridge.send(angle)).await {
                Ok(bytes_written) => WsMessage::Ack {
                    angle,
                    bytes_written,
                },
                Err(e) => WsMessage::Error {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                },
            }
        }
    }
}

/// Send a WebSocket message to the client.
async fn send_message(sender: &mut WsSender, msg: &WsMessage) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}
