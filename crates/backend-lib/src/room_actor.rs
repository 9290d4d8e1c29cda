// ============================
// crates/backend-lib/src/room_actor.rs
// ============================
//! One tokio task per room. Every mutation of a [`Room`] happens inside
//! its actor, so commands on the same room are processed one at a time
//! in arrival order; no locks are taken around room state. The actor
//! also owns the subscriber map and does all broadcast/unicast fan-out,
//! best-effort: a slow or closed client loses messages, never stalls
//! the room.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use huddle_common::{
    ConfigPatch, Role, ServerMessage, DENY_REASON_DENIED, DENY_REASON_PASSCODE,
};
use metrics::counter;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::AppError;
use crate::metrics::{BROADCAST_DROPPED, CMD_IGNORED, ROOM_ENDED, ROOM_JOINED};
use crate::registry::ConnectionRegistry;
use crate::room::{JoinOutcome, LeaveEffects, Room};

/// Per-client outbound channel, written by room actors and drained by
/// the connection's writer task.
pub type Outbound = mpsc::Sender<ServerMessage>;

/// Connection-negotiation payload carried by the relay untouched.
#[derive(Debug, Clone)]
pub enum SignalPayload {
    Offer(String),
    Answer(String),
    Ice(Value),
}

/// Message sent *into* the actor.
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        user_id: String,
        name: String,
        passcode: Option<String>,
        tx: Outbound,
    },
    Leave {
        user_id: String,
    },
    Admit {
        by_user_id: String,
        user_id: String,
    },
    Deny {
        by_user_id: String,
        user_id: String,
    },
    AdmitAll {
        by_user_id: String,
    },
    Kick {
        by_user_id: String,
        user_id: String,
    },
    Mute {
        by_user_id: String,
        user_id: String,
    },
    MuteAll {
        by_user_id: String,
    },
    End {
        by_user_id: String,
    },
    LowerAllHands {
        by_user_id: String,
    },
    SetRole {
        by_user_id: String,
        user_id: String,
        role: Role,
    },
    TransferHost {
        by_user_id: String,
        user_id: String,
    },
    Config {
        by_user_id: String,
        patch: ConfigPatch,
    },
    Chat {
        user_id: String,
        text: String,
    },
    Reaction {
        user_id: String,
        emoji: String,
    },
    Hand {
        user_id: String,
        up: bool,
    },
    SpotlightSet {
        by_user_id: String,
        user_id: Option<String>,
    },
    Recording {
        user_id: String,
        on: bool,
    },
    PollCreate {
        by_user_id: String,
        question: String,
        options: Vec<String>,
        poll_id: Option<String>,
    },
    PollVote {
        user_id: String,
        poll_id: String,
        option_index: usize,
    },
    PollClose {
        by_user_id: String,
        poll_id: String,
    },
    /// Signaling relay: pass-through, no authorization, no state.
    Signal {
        to_user_id: String,
        from_user_id: String,
        payload: SignalPayload,
    },
    /// Reaper/introspection query.
    Status {
        resp_tx: mpsc::UnboundedSender<RoomStatus>,
    },
}

/// Snapshot of room occupancy for the reaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomStatus {
    pub participants: usize,
    pub waiting: usize,
    /// How long the room has had no members and no subscribers.
    pub empty_for: Option<Duration>,
}

/// Handle other components keep: the actor's command channel.
#[derive(Clone)]
pub struct RoomHandle {
    cmd_tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    /// Dispatch a command. A dead room swallows it, matching the
    /// "missing room is a no-op" rule.
    pub fn send(&self, cmd: RoomCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            debug!("command dropped, room actor gone");
        }
    }

    /// True once the actor has terminated (room ended).
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    pub async fn status(&self) -> Result<RoomStatus, AppError> {
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
        self.cmd_tx
            .send(RoomCommand::Status { resp_tx })
            .map_err(|_| AppError::RoomClosed)?;
        resp_rx.recv().await.ok_or(AppError::RoomClosed)
    }
}

/// Fan-out mode for offer/answer/ice (see DESIGN.md): room-wide by
/// default, targeted unicast when enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActorOptions {
    pub relay_unicast: bool,
}

/// Spawn a new room actor and return its handle.
pub fn spawn_room_actor(
    room_id: &str,
    creator_id: &str,
    opts: ActorOptions,
    registry: ConnectionRegistry,
) -> RoomHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let actor = RoomActor {
        room: Room::new(room_id, creator_id),
        subscribers: HashMap::new(),
        waiting_subs: HashMap::new(),
        registry,
        relay_unicast: opts.relay_unicast,
        empty_since: Some(Instant::now()),
    };
    tokio::spawn(actor.run(cmd_rx));
    RoomHandle { cmd_tx }
}

struct RoomActor {
    room: Room,
    /// Admitted members only; room broadcasts go here and nowhere else.
    subscribers: HashMap<String, Outbound>,
    /// Lobby-scoped senders. A waiting user only ever receives
    /// `waiting-you`, its admission/denial and `ended`.
    waiting_subs: HashMap<String, Outbound>,
    registry: ConnectionRegistry,
    relay_unicast: bool,
    empty_since: Option<Instant>,
}

enum Flow {
    Continue,
    /// Room ended; the actor terminates and its channel closes.
    Ended,
}

impl RoomActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RoomCommand>) {
        while let Some(cmd) = rx.recv().await {
            if matches!(self.handle(cmd), Flow::Ended) {
                break;
            }
            self.track_emptiness();
        }
        debug!(room_id = %self.room.room_id(), "room actor stopped");
    }

    #[allow(clippy::too_many_lines)]
    fn handle(&mut self, cmd: RoomCommand) -> Flow {
        match cmd {
            RoomCommand::Join {
                user_id,
                name,
                passcode,
                tx,
            } => self.on_join(user_id, name, passcode, tx),
            RoomCommand::Leave { user_id } => {
                let fx = self.room.leave(&user_id);
                self.subscribers.remove(&user_id);
                self.waiting_subs.remove(&user_id);
                self.broadcast_leave_effects(&user_id, &fx);
            }
            RoomCommand::Admit {
                by_user_id,
                user_id,
            } => {
                if let Some(admitted) = self.room.admit(&by_user_id, &user_id) {
                    self.promote_to_room(&admitted.user_id);
                    self.unicast(
                        &admitted.user_id,
                        ServerMessage::Admitted {
                            room_id: self.room_id(),
                            user_id: admitted.user_id.clone(),
                        },
                    );
                    self.send_state_bundle(&admitted.user_id);
                    self.broadcast(ServerMessage::Waiting {
                        room_id: self.room_id(),
                        waiting: self.room.waiting_snapshot(),
                    });
                    self.broadcast_participants();
                } else {
                    self.ignored("admit", &by_user_id);
                }
            }
            RoomCommand::Deny {
                by_user_id,
                user_id,
            } => {
                if self.room.deny(&by_user_id, &user_id) {
                    let denial = ServerMessage::JoinDenied {
                        room_id: self.room_id(),
                        reason: DENY_REASON_DENIED.into(),
                    };
                    // The lobby sender may be stale after a reconnect;
                    // the registry holds the live binding.
                    let lobby_tx = self.waiting_subs.remove(&user_id);
                    if let Some(tx) = self.registry.sender_for(&user_id).or(lobby_tx) {
                        let _ = tx.try_send(denial);
                    }
                    self.broadcast(ServerMessage::Waiting {
                        room_id: self.room_id(),
                        waiting: self.room.waiting_snapshot(),
                    });
                } else {
                    self.ignored("deny", &by_user_id);
                }
            }
            RoomCommand::AdmitAll { by_user_id } => {
                if !self.room.can_moderate(&by_user_id) {
                    self.ignored("admit-all", &by_user_id);
                } else {
                    // An empty waiting list is a legitimate no-op, not
                    // an ignored command.
                    let admitted = self.room.admit_all(&by_user_id);
                    if !admitted.is_empty() {
                        for user in admitted {
                            self.promote_to_room(&user.user_id);
                            self.unicast(
                                &user.user_id,
                                ServerMessage::Admitted {
                                    room_id: self.room_id(),
                                    user_id: user.user_id.clone(),
                                },
                            );
                            self.send_state_bundle(&user.user_id);
                        }
                        // One waiting + participants broadcast for the batch.
                        self.broadcast(ServerMessage::Waiting {
                            room_id: self.room_id(),
                            waiting: self.room.waiting_snapshot(),
                        });
                        self.broadcast_participants();
                    }
                }
            }
            RoomCommand::Kick {
                by_user_id,
                user_id,
            } => {
                if let Some(fx) = self.room.kick(&by_user_id, &user_id) {
                    // The kicked client learns of its own removal.
                    self.unicast(
                        &user_id,
                        ServerMessage::UserLeft {
                            room_id: self.room_id(),
                            user_id: user_id.clone(),
                        },
                    );
                    self.subscribers.remove(&user_id);
                    self.broadcast_leave_effects(&user_id, &fx);
                } else {
                    self.ignored("kick", &by_user_id);
                }
            }
            RoomCommand::Mute {
                by_user_id,
                user_id,
            } => {
                if self.room.mute(&by_user_id, &user_id) {
                    self.broadcast(ServerMessage::Muted {
                        room_id: self.room_id(),
                        user_id,
                    });
                    self.broadcast_participants();
                } else {
                    self.ignored("mute", &by_user_id);
                }
            }
            RoomCommand::MuteAll { by_user_id } => {
                if self.room.mute_all(&by_user_id) {
                    // One room-wide notice, no per-user mute events.
                    self.broadcast(ServerMessage::MutedAll {
                        room_id: self.room_id(),
                        by_user_id,
                    });
                } else {
                    self.ignored("mute-all", &by_user_id);
                }
            }
            RoomCommand::End { by_user_id } => {
                if self.room.is_host(&by_user_id) {
                    let notice = ServerMessage::Ended {
                        room_id: self.room_id(),
                        by_user_id,
                    };
                    // Waiting users learn the wait can never complete.
                    for tx in self.waiting_subs.values() {
                        let _ = tx.try_send(notice.clone());
                    }
                    self.broadcast(notice);
                    counter!(ROOM_ENDED).increment(1);
                    return Flow::Ended;
                }
                self.ignored("end", &by_user_id);
            }
            RoomCommand::LowerAllHands { by_user_id } => {
                if self.room.can_moderate(&by_user_id) {
                    // Pure UI reset; no hand state is stored server-side.
                    for user_id in self.room.participant_ids() {
                        self.broadcast(ServerMessage::HandDown {
                            room_id: self.room_id(),
                            user_id,
                        });
                    }
                } else {
                    self.ignored("lower-all-hands", &by_user_id);
                }
            }
            RoomCommand::SetRole {
                by_user_id,
                user_id,
                role,
            } => {
                if self.room.set_role(&by_user_id, &user_id, role) {
                    self.broadcast_participants();
                } else {
                    self.ignored("role", &by_user_id);
                }
            }
            RoomCommand::TransferHost {
                by_user_id,
                user_id,
            } => {
                if self.room.transfer_host(&by_user_id, &user_id) {
                    self.broadcast_participants();
                    self.broadcast(ServerMessage::HostChanged {
                        room_id: self.room_id(),
                        host_id: user_id,
                    });
                } else {
                    self.ignored("transfer-host", &by_user_id);
                }
            }
            RoomCommand::Config { by_user_id, patch } => {
                if self.room.apply_config(&by_user_id, &patch) {
                    self.broadcast(ServerMessage::ConfigUpdated {
                        room_id: self.room_id(),
                        config: self.room.config_snapshot(),
                    });
                } else {
                    self.ignored("config", &by_user_id);
                }
            }
            RoomCommand::Chat { user_id, text } => {
                if self.room.chat_allowed(&user_id) {
                    self.broadcast(ServerMessage::Chat {
                        room_id: self.room_id(),
                        user_id,
                        text,
                        ts: Utc::now().timestamp_millis(),
                    });
                } else {
                    self.ignored("chat", &user_id);
                }
            }
            RoomCommand::Reaction { user_id, emoji } => {
                if self.room.reaction_allowed(&user_id) {
                    self.broadcast(ServerMessage::Reaction {
                        room_id: self.room_id(),
                        user_id,
                        emoji,
                        ts: Utc::now().timestamp_millis(),
                    });
                } else {
                    self.ignored("reaction", &user_id);
                }
            }
            RoomCommand::Hand { user_id, up } => {
                if self.room.is_participant(&user_id) {
                    self.broadcast(ServerMessage::Hand {
                        room_id: self.room_id(),
                        user_id,
                        up,
                    });
                } else {
                    self.ignored("hand", &user_id);
                }
            }
            RoomCommand::SpotlightSet {
                by_user_id,
                user_id,
            } => {
                if self.room.set_spotlight(&by_user_id, user_id.as_deref()) {
                    self.broadcast(ServerMessage::Spotlight {
                        room_id: self.room_id(),
                        user_id: self.room.spotlight().map(str::to_string),
                    });
                } else {
                    self.ignored("spotlight-set", &by_user_id);
                }
            }
            RoomCommand::Recording { user_id, on } => {
                if self.room.set_recording(&user_id, on) {
                    self.broadcast(ServerMessage::Recording {
                        room_id: self.room_id(),
                        user_id,
                        on,
                    });
                } else {
                    self.ignored("recording", &user_id);
                }
            }
            RoomCommand::PollCreate {
                by_user_id,
                question,
                options,
                poll_id,
            } => {
                if self
                    .room
                    .create_poll(&by_user_id, &question, &options, poll_id)
                    .is_some()
                {
                    self.broadcast_polls();
                } else {
                    self.ignored("poll-create", &by_user_id);
                }
            }
            RoomCommand::PollVote {
                user_id,
                poll_id,
                option_index,
            } => {
                if self.room.vote(&user_id, &poll_id, option_index) {
                    self.broadcast_polls();
                } else {
                    self.ignored("poll-vote", &user_id);
                }
            }
            RoomCommand::PollClose {
                by_user_id,
                poll_id,
            } => {
                if self.room.close_poll(&by_user_id, &poll_id) {
                    self.broadcast_polls();
                } else {
                    self.ignored("poll-close", &by_user_id);
                }
            }
            RoomCommand::Signal {
                to_user_id,
                from_user_id,
                payload,
            } => {
                let msg = match payload {
                    SignalPayload::Offer(sdp) => ServerMessage::Offer {
                        room_id: self.room_id(),
                        to_user_id: to_user_id.clone(),
                        from_user_id,
                        sdp,
                    },
                    SignalPayload::Answer(sdp) => ServerMessage::Answer {
                        room_id: self.room_id(),
                        to_user_id: to_user_id.clone(),
                        from_user_id,
                        sdp,
                    },
                    SignalPayload::Ice(candidate) => ServerMessage::Ice {
                        room_id: self.room_id(),
                        to_user_id: to_user_id.clone(),
                        from_user_id,
                        candidate,
                    },
                };
                if self.relay_unicast {
                    self.unicast(&to_user_id, msg);
                } else {
                    // Reference behavior: whole-room fan-out; clients
                    // filter on toUserId.
                    self.broadcast(msg);
                }
            }
            RoomCommand::Status { resp_tx } => {
                let _ = resp_tx.send(RoomStatus {
                    participants: self.room.participant_count(),
                    waiting: self.room.waiting_count(),
                    empty_for: self.empty_since.map(|t| t.elapsed()),
                });
            }
        }
        Flow::Continue
    }

    fn on_join(&mut self, user_id: String, name: String, passcode: Option<String>, tx: Outbound) {
        // The sender is not subscribed until the outcome says where it
        // belongs; a waiting user must not sit on the broadcast path.
        match self.room.join(&user_id, &name, passcode.as_deref()) {
            JoinOutcome::DeniedPasscode => {
                let _ = tx.try_send(ServerMessage::JoinDenied {
                    room_id: self.room_id(),
                    reason: DENY_REASON_PASSCODE.into(),
                });
            }
            JoinOutcome::Waiting => {
                let _ = tx.try_send(ServerMessage::WaitingYou {
                    room_id: self.room_id(),
                });
                self.waiting_subs.insert(user_id, tx);
                self.broadcast(ServerMessage::Waiting {
                    room_id: self.room_id(),
                    waiting: self.room.waiting_snapshot(),
                });
            }
            JoinOutcome::Joined { muted } => {
                counter!(ROOM_JOINED).increment(1);
                self.waiting_subs.remove(&user_id);
                self.subscribers.insert(user_id.clone(), tx);
                self.broadcast_participants();
                self.send_state_bundle(&user_id);
                self.broadcast_except(
                    &user_id,
                    ServerMessage::UserJoined {
                        room_id: self.room_id(),
                        user_id: user_id.clone(),
                        name,
                    },
                );
                if muted {
                    self.broadcast(ServerMessage::Muted {
                        room_id: self.room_id(),
                        user_id,
                    });
                }
            }
        }
    }

    /// Move a just-admitted user's sender onto the room broadcast
    /// path, falling back to the registry when the lobby sender was
    /// replaced by a reconnect.
    fn promote_to_room(&mut self, user_id: &str) {
        let lobby_tx = self.waiting_subs.remove(user_id);
        if let Some(tx) = self.registry.sender_for(user_id).or(lobby_tx) {
            self.subscribers.insert(user_id.to_string(), tx);
        }
    }

    /// Unicast the state a freshly admitted client needs to render the
    /// room: polls, config, spotlight and the active recording set.
    fn send_state_bundle(&mut self, user_id: &str) {
        self.unicast(user_id, ServerMessage::Polls {
            room_id: self.room_id(),
            polls: self.room.polls_snapshot(),
        });
        self.unicast(user_id, ServerMessage::ConfigUpdated {
            room_id: self.room_id(),
            config: self.room.config_snapshot(),
        });
        self.unicast(user_id, ServerMessage::Spotlight {
            room_id: self.room_id(),
            user_id: self.room.spotlight().map(str::to_string),
        });
        for rec in self.room.recording_ids() {
            self.unicast(user_id, ServerMessage::Recording {
                room_id: self.room_id(),
                user_id: rec,
                on: true,
            });
        }
    }

    fn broadcast_leave_effects(&mut self, user_id: &str, fx: &LeaveEffects) {
        if fx.was_waiting {
            self.broadcast(ServerMessage::Waiting {
                room_id: self.room_id(),
                waiting: self.room.waiting_snapshot(),
            });
        }
        if !fx.was_participant {
            return;
        }
        if fx.recording_stopped {
            self.broadcast(ServerMessage::Recording {
                room_id: self.room_id(),
                user_id: user_id.to_string(),
                on: false,
            });
        }
        if fx.spotlight_cleared {
            self.broadcast(ServerMessage::Spotlight {
                room_id: self.room_id(),
                user_id: None,
            });
        }
        if let Some(host_id) = &fx.new_host {
            self.broadcast(ServerMessage::HostChanged {
                room_id: self.room_id(),
                host_id: host_id.clone(),
            });
        }
        self.broadcast_participants();
        self.broadcast(ServerMessage::UserLeft {
            room_id: self.room_id(),
            user_id: user_id.to_string(),
        });
    }

    fn room_id(&self) -> String {
        self.room.room_id().to_string()
    }

    fn broadcast_participants(&mut self) {
        self.broadcast(ServerMessage::Participants {
            room_id: self.room_id(),
            participants: self.room.participants_snapshot(),
        });
    }

    fn broadcast_polls(&mut self) {
        self.broadcast(ServerMessage::Polls {
            room_id: self.room_id(),
            polls: self.room.polls_snapshot(),
        });
    }

    fn broadcast(&mut self, msg: ServerMessage) {
        let mut gone = Vec::new();
        for (user_id, tx) in &self.subscribers {
            match tx.try_send(msg.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => gone.push(user_id.clone()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    counter!(BROADCAST_DROPPED).increment(1);
                }
            }
        }
        for user_id in gone {
            self.subscribers.remove(&user_id);
        }
    }

    fn broadcast_except(&mut self, skip_user_id: &str, msg: ServerMessage) {
        let mut gone = Vec::new();
        for (user_id, tx) in &self.subscribers {
            if user_id == skip_user_id {
                continue;
            }
            match tx.try_send(msg.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => gone.push(user_id.clone()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    counter!(BROADCAST_DROPPED).increment(1);
                }
            }
        }
        for user_id in gone {
            self.subscribers.remove(&user_id);
        }
    }

    fn unicast(&mut self, user_id: &str, msg: ServerMessage) {
        if let Some(tx) = self.subscribers.get(user_id) {
            if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(msg) {
                self.subscribers.remove(user_id);
            }
        }
    }

    /// Silent no-op per the error policy; only operators see it.
    fn ignored(&self, action: &str, actor_id: &str) {
        counter!(CMD_IGNORED, "action" => action.to_string()).increment(1);
        debug!(
            room_id = %self.room.room_id(),
            actor_id,
            action,
            "command ignored"
        );
    }

    fn track_emptiness(&mut self) {
        let empty = self.subscribers.is_empty()
            && self.waiting_subs.is_empty()
            && self.room.participant_count() == 0
            && self.room.waiting_count() == 0;
        if empty {
            if self.empty_since.is_none() {
                self.empty_since = Some(Instant::now());
            }
        } else {
            self.empty_since = None;
        }
    }
}
