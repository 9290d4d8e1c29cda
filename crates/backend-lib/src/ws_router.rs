// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! WebSocket router and connection handling.
use std::collections::HashSet;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use huddle_common::{ClientMessage, ServerMessage};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::debug;
use uuid::Uuid;

use crate::metrics::{WS_ACTIVE, WS_CONNECTION, WS_MALFORMED};
use crate::room_actor::{RoomCommand, SignalPayload};
use crate::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    counter!(WS_CONNECTION).increment(1);
    gauge!(WS_ACTIVE).increment(1.0);
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let conn_id = Uuid::new_v4();

    // Writer task: drain the outbound channel into text frames. Room
    // actors write into this channel with try_send and never block.
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(64);
    let send_task = tokio::spawn(async move {
        while let Some(server_msg) = out_rx.recv().await {
            let Ok(json) = serde_json::to_string(&server_msg) else {
                continue;
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Identity is bound by the first join; rooms joined on this
    // connection are tracked for disconnect cleanup.
    let mut identity: Option<String> = None;
    let mut joined: HashSet<(String, String)> = HashSet::new();

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => msg,
                    Err(err) => {
                        // Malformed input is dropped, never answered.
                        counter!(WS_MALFORMED).increment(1);
                        debug!(%err, "dropping malformed message");
                        continue;
                    }
                };
                dispatch(
                    &state,
                    &out_tx,
                    conn_id,
                    &mut identity,
                    &mut joined,
                    client_msg,
                );
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Best-effort cleanup, equivalent to leave in every joined room.
    for (room_id, user_id) in &joined {
        if let Some(handle) = state.rooms.get(room_id) {
            handle.send(RoomCommand::Leave {
                user_id: user_id.clone(),
            });
        }
    }
    if let Some(user_id) = &identity {
        state.registry.unbind(user_id, conn_id);
    }

    gauge!(WS_ACTIVE).decrement(1.0);
    send_task.abort();
}

fn dispatch(
    state: &AppState,
    out_tx: &mpsc::Sender<ServerMessage>,
    conn_id: Uuid,
    identity: &mut Option<String>,
    joined: &mut HashSet<(String, String)>,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::Join {
            room_id,
            user_id,
            name,
            passcode,
        } => {
            if identity.is_none() {
                state.registry.bind(&user_id, conn_id, out_tx.clone());
                *identity = Some(user_id.clone());
            }
            joined.insert((room_id.clone(), user_id.clone()));
            let handle = state.rooms.get_or_create(&room_id, &user_id);
            handle.send(RoomCommand::Join {
                user_id,
                name,
                passcode,
                tx: out_tx.clone(),
            });
        }
        other => {
            let room_id = other.room_id().to_string();
            // Messages for unknown rooms vanish silently.
            let Some(handle) = state.rooms.get(&room_id) else {
                debug!(room_id, "message for unknown room dropped");
                return;
            };
            if let Some(cmd) = to_command(other) {
                handle.send(cmd);
            }
        }
    }
}

/// Map a non-join client message onto its room command.
fn to_command(msg: ClientMessage) -> Option<RoomCommand> {
    let cmd = match msg {
        ClientMessage::Join { .. } => return None,
        ClientMessage::Admit {
            by_user_id,
            user_id,
            ..
        } => RoomCommand::Admit {
            by_user_id,
            user_id,
        },
        ClientMessage::Deny {
            by_user_id,
            user_id,
            ..
        } => RoomCommand::Deny {
            by_user_id,
            user_id,
        },
        ClientMessage::AdmitAll { by_user_id, .. } => RoomCommand::AdmitAll { by_user_id },
        ClientMessage::Kick {
            by_user_id,
            user_id,
            ..
        } => RoomCommand::Kick {
            by_user_id,
            user_id,
        },
        ClientMessage::Mute {
            by_user_id,
            user_id,
            ..
        } => RoomCommand::Mute {
            by_user_id,
            user_id,
        },
        ClientMessage::MuteAll { by_user_id, .. } => RoomCommand::MuteAll { by_user_id },
        ClientMessage::End { by_user_id, .. } => RoomCommand::End { by_user_id },
        ClientMessage::LowerAllHands { by_user_id, .. } => {
            RoomCommand::LowerAllHands { by_user_id }
        }
        ClientMessage::SetRole {
            by_user_id,
            user_id,
            role,
            ..
        } => RoomCommand::SetRole {
            by_user_id,
            user_id,
            role,
        },
        ClientMessage::TransferHost {
            by_user_id,
            user_id,
            ..
        } => RoomCommand::TransferHost {
            by_user_id,
            user_id,
        },
        ClientMessage::Config {
            by_user_id, patch, ..
        } => RoomCommand::Config { by_user_id, patch },
        ClientMessage::Offer {
            to_user_id,
            from_user_id,
            sdp,
            ..
        } => RoomCommand::Signal {
            to_user_id,
            from_user_id,
            payload: SignalPayload::Offer(sdp),
        },
        ClientMessage::Answer {
            to_user_id,
            from_user_id,
            sdp,
            ..
        } => RoomCommand::Signal {
            to_user_id,
            from_user_id,
            payload: SignalPayload::Answer(sdp),
        },
        ClientMessage::Ice {
            to_user_id,
            from_user_id,
            candidate,
            ..
        } => RoomCommand::Signal {
            to_user_id,
            from_user_id,
            payload: SignalPayload::Ice(candidate),
        },
        ClientMessage::Chat { user_id, text, .. } => RoomCommand::Chat { user_id, text },
        ClientMessage::Reaction { user_id, emoji, .. } => RoomCommand::Reaction { user_id, emoji },
        ClientMessage::Hand { user_id, up, .. } => RoomCommand::Hand { user_id, up },
        ClientMessage::SpotlightSet {
            by_user_id,
            user_id,
            ..
        } => RoomCommand::SpotlightSet {
            by_user_id,
            user_id,
        },
        ClientMessage::Recording { user_id, on, .. } => RoomCommand::Recording { user_id, on },
        ClientMessage::PollCreate {
            by_user_id,
            question,
            options,
            poll_id,
            ..
        } => RoomCommand::PollCreate {
            by_user_id,
            question,
            options,
            poll_id,
        },
        ClientMessage::PollVote {
            user_id,
            poll_id,
            option_index,
            ..
        } => RoomCommand::PollVote {
            user_id,
            poll_id,
            option_index,
        },
        ClientMessage::PollClose {
            by_user_id,
            poll_id,
            ..
        } => RoomCommand::PollClose {
            by_user_id,
            poll_id,
        },
    };
    Some(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn join_is_not_a_plain_room_command() {
        let msg = ClientMessage::Join {
            room_id: "r1".into(),
            user_id: "u1".into(),
            name: "U".into(),
            passcode: None,
        };
        assert!(to_command(msg).is_none());
    }

    #[test]
    fn signaling_messages_map_to_relay_commands() {
        let msg = ClientMessage::Offer {
            room_id: "r1".into(),
            to_user_id: "b".into(),
            from_user_id: "a".into(),
            sdp: "v=0".into(),
        };
        let cmd = to_command(msg).unwrap();
        assert!(matches!(
            cmd,
            RoomCommand::Signal {
                payload: SignalPayload::Offer(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn router_builds_with_default_state() {
        let state = AppState::new(Settings::default());
        let _router = create_router(state);
    }
}
