//! Per-connection WebSocket session handling.
//!
//! A socket identifies itself first, then issues room-scoped actions. Room
//! events reach the socket through an unbounded channel: a forwarder task
//! serializes them while a dedicated writer task owns the outbound sink, so
//! broadcasts keep flowing while the read loop is blocked on a frame.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt, stream::SplitStream};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::auth::UserIdentity;
use crate::dto::ws::{ClientAction, ServerEvent};
use crate::error::ServiceError;
use crate::services::{
    room_actor::{Caller, RoomCommand},
    room_registry,
};
use crate::state::{Connection, SharedState};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle the full lifecycle of one client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Message>();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = raw_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // Forwarder turning room events into text frames.
    let forward_raw = raw_tx.clone();
    let forwarder_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(payload) => {
                    if forward_raw.send(Message::Text(payload.into())).is_err() {
                        break;
                    }
                }
                Err(err) => warn!(error = %err, "failed to serialize server event"),
            }
        }
    });

    let identity = match identify(&state, &mut receiver, &event_tx, &raw_tx).await {
        Some(identity) => identity,
        None => {
            finalize(writer_task, forwarder_task, raw_tx, event_tx).await;
            return;
        }
    };

    let _ = event_tx.send(ServerEvent::Identified {
        user: identity.clone(),
    });
    let conn = Connection::new(event_tx.clone());
    info!(user_id = %identity.id, username = %identity.username, "client identified");

    // Rooms this socket joined; on close each one gets a disconnect notice
    // tagged with this connection's id so rejoins are never knocked offline.
    let mut joined: Vec<String> = Vec::new();

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientAction>(&text) {
                Ok(action) => {
                    handle_action(&state, &identity, &conn, &mut joined, action).await;
                }
                Err(err) => {
                    debug!(user_id = %identity.id, error = %err, "unparseable client message");
                    let _ = event_tx.send(ServerEvent::error(&ServiceError::InvalidInput(
                        format!("malformed message: {err}"),
                    )));
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = raw_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                debug!(user_id = %identity.id, "client closed the socket");
                let _ = raw_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(user_id = %identity.id, error = %err, "websocket error");
                break;
            }
        }
    }

    for code in joined {
        if let Ok(handle) = room_registry::lookup(&state, &code) {
            let _ = handle.send(RoomCommand::Disconnected {
                user_id: identity.id,
                conn_id: Some(conn.id),
            });
        }
    }
    info!(user_id = %identity.id, "client disconnected");

    // The forwarder only exits once every event sender is gone, so the local
    // connection must be released before waiting on it.
    drop(conn);
    finalize(writer_task, forwarder_task, raw_tx, event_tx).await;
}

/// Run the identification phase: first frame must be an `identify` action.
async fn identify(
    state: &SharedState,
    receiver: &mut SplitStream<WebSocket>,
    event_tx: &mpsc::UnboundedSender<ServerEvent>,
    raw_tx: &mpsc::UnboundedSender<Message>,
) -> Option<UserIdentity> {
    let initial = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => return None,
        Ok(Some(Ok(_))) => {
            let _ = raw_tx.send(Message::Close(None));
            return None;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            return None;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            return None;
        }
    };

    let token = match serde_json::from_str::<ClientAction>(&initial) {
        Ok(ClientAction::Identify { token }) => token,
        Ok(_) => {
            warn!("first message was not an identification");
            let _ = raw_tx.send(Message::Close(None));
            return None;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse identification message");
            let _ = raw_tx.send(Message::Close(None));
            return None;
        }
    };

    match state.auth().resolve(&token).await {
        Ok(identity) => Some(identity),
        Err(err) => {
            let _ = event_tx.send(ServerEvent::error(&ServiceError::Auth(err)));
            let _ = raw_tx.send(Message::Close(None));
            None
        }
    }
}

/// Dispatch one parsed client action.
async fn handle_action(
    state: &SharedState,
    identity: &UserIdentity,
    conn: &Connection,
    joined: &mut Vec<String>,
    action: ClientAction,
) {
    let caller = Caller {
        identity: identity.clone(),
        conn: conn.clone(),
    };
    let result = match action {
        ClientAction::Identify { .. } => {
            debug!(user_id = %identity.id, "ignoring duplicate identification");
            Ok(())
        }
        ClientAction::CreateRoom { quiz_id, config } => {
            match room_registry::create_room(state, identity.clone(), conn.clone(), quiz_id, config)
                .await
            {
                Ok(summary) => {
                    track(joined, &summary.code);
                    let _ = conn.tx.send(ServerEvent::RoomCreated { room: summary });
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }
        ClientAction::Join { room_code } => {
            match room_registry::lookup(state, &room_code) {
                Ok(handle) => handle
                    .join(caller)
                    .await
                    .map(|_outcome| track(joined, handle.code())),
                Err(err) => Err(err),
            }
        }
        ClientAction::Ready { room_code, ready } => {
            send_to_room(state, &room_code, RoomCommand::Ready { caller, ready })
        }
        ClientAction::StartQuiz { room_code } => {
            send_to_room(state, &room_code, RoomCommand::StartQuiz { caller })
        }
        ClientAction::SubmitAnswer {
            room_code,
            question_index,
            value,
            time_taken_secs,
        } => send_to_room(
            state,
            &room_code,
            RoomCommand::SubmitAnswer {
                caller,
                question_index,
                value,
                time_taken_secs,
            },
        ),
        ClientAction::NextQuestion { room_code } => {
            send_to_room(state, &room_code, RoomCommand::NextQuestion { caller })
        }
        ClientAction::EndQuiz { room_code } => {
            send_to_room(state, &room_code, RoomCommand::EndQuiz { caller })
        }
        ClientAction::Pause { room_code } => {
            send_to_room(state, &room_code, RoomCommand::Pause { caller })
        }
        ClientAction::Resume { room_code } => {
            send_to_room(state, &room_code, RoomCommand::Resume { caller })
        }
        ClientAction::Kick { room_code, user_id } => send_to_room(
            state,
            &room_code,
            RoomCommand::Kick {
                caller,
                target: user_id,
            },
        ),
        ClientAction::Leave { room_code } => {
            joined.retain(|code| !code.eq_ignore_ascii_case(&room_code));
            send_to_room(
                state,
                &room_code,
                RoomCommand::Disconnected {
                    user_id: identity.id,
                    conn_id: None,
                },
            )
        }
        ClientAction::Unknown => {
            debug!(user_id = %identity.id, "ignoring unknown action type");
            Ok(())
        }
    };

    if let Err(err) = result {
        debug!(user_id = %identity.id, error = %err, "client action rejected");
        let _ = conn.tx.send(ServerEvent::error(&err));
    }
}

/// Route a command to a room by code.
fn send_to_room(
    state: &SharedState,
    room_code: &str,
    command: RoomCommand,
) -> Result<(), ServiceError> {
    room_registry::lookup(state, room_code)?.send(command)
}

fn track(joined: &mut Vec<String>, code: &str) {
    if !joined.iter().any(|existing| existing == code) {
        joined.push(code.to_owned());
    }
}

/// Ensure the writer and forwarder tasks wind down before returning.
async fn finalize(
    writer_task: JoinHandle<()>,
    forwarder_task: JoinHandle<()>,
    raw_tx: mpsc::UnboundedSender<Message>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    drop(event_tx);
    let _ = forwarder_task.await;
    drop(raw_tx);
    let _ = writer_task.await;
}
