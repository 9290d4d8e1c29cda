// ================
// crates/common/src/lib.rs
// ================
//! Shared types and wire protocol for the huddle meeting backend.
//! Defines the WebSocket messages exchanged between clients and the
//! room coordination engine, plus the snapshot types broadcast to rooms.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Participant role within a room. Exactly one participant holds
/// [`Role::Host`] at any time while the room is active.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Cohost,
    Guest,
}

/// One entry of the `participants` snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub user_id: String,
    pub role: Role,
    pub muted: bool,
    pub name: String,
}

/// One entry of the `waiting` snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WaitingEntry {
    pub user_id: String,
    pub name: String,
}

/// Full policy-flag snapshot broadcast after a config change and
/// unicast to a freshly admitted participant. The passcode itself is
/// never echoed; only whether one is set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub lobby: bool,
    pub locked: bool,
    pub passcode_set: bool,
    pub mute_on_join: bool,
    pub allow_chat: bool,
    pub allow_reactions: bool,
    pub allow_screen_share: bool,
    pub allow_local_recording: bool,
}

/// Merge patch for room policy flags. Absent fields are left untouched.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub lobby: Option<bool>,
    pub locked: Option<bool>,
    pub passcode: Option<String>,
    pub mute_on_join: Option<bool>,
    pub allow_chat: Option<bool>,
    pub allow_reactions: Option<bool>,
    pub allow_screen_share: Option<bool>,
    pub allow_local_recording: Option<bool>,
}

/// One option row of a poll snapshot. Voter identities stay server-side;
/// only the tally is published.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PollOptionSnapshot {
    pub text: String,
    pub votes: usize,
}

/// Snapshot of one poll, broadcast as part of the full poll list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PollSnapshot {
    pub id: String,
    pub question: String,
    pub options: Vec<PollOptionSnapshot>,
    pub closed: bool,
}

/// Messages sent from client to server over the persistent connection.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Request admission into a room, creating it on first join.
    Join {
        room_id: String,
        user_id: String,
        name: String,
        #[serde(default)]
        passcode: Option<String>,
    },
    /// Move a waiting user into the participants set.
    Admit {
        room_id: String,
        by_user_id: String,
        user_id: String,
    },
    /// Remove a waiting user without admitting them.
    Deny {
        room_id: String,
        by_user_id: String,
        user_id: String,
    },
    /// Drain the entire waiting list in one pass.
    AdmitAll { room_id: String, by_user_id: String },
    /// Remove a participant from the room.
    Kick {
        room_id: String,
        by_user_id: String,
        user_id: String,
    },
    /// Flag a single participant as muted.
    Mute {
        room_id: String,
        by_user_id: String,
        user_id: String,
    },
    /// Flag every participant as muted.
    MuteAll { room_id: String, by_user_id: String },
    /// End the meeting and discard all room state.
    End { room_id: String, by_user_id: String },
    /// Broadcast a hand-down reset for every participant.
    LowerAllHands { room_id: String, by_user_id: String },
    /// Change a participant's role between guest and cohost.
    #[serde(rename = "role")]
    SetRole {
        room_id: String,
        by_user_id: String,
        user_id: String,
        role: Role,
    },
    /// Hand the host role to another participant.
    TransferHost {
        room_id: String,
        by_user_id: String,
        user_id: String,
    },
    /// Merge policy-flag changes into the room config.
    Config {
        room_id: String,
        by_user_id: String,
        #[serde(flatten)]
        patch: ConfigPatch,
    },
    /// Connection-negotiation offer, relayed verbatim.
    Offer {
        room_id: String,
        to_user_id: String,
        from_user_id: String,
        sdp: String,
    },
    /// Connection-negotiation answer, relayed verbatim.
    Answer {
        room_id: String,
        to_user_id: String,
        from_user_id: String,
        sdp: String,
    },
    /// ICE candidate, relayed verbatim.
    Ice {
        room_id: String,
        to_user_id: String,
        from_user_id: String,
        candidate: Value,
    },
    /// Room-scoped chat line.
    Chat {
        room_id: String,
        user_id: String,
        text: String,
    },
    /// Room-scoped emoji reaction.
    Reaction {
        room_id: String,
        user_id: String,
        emoji: String,
    },
    /// Raise or lower the caller's hand (not persisted server-side).
    Hand {
        room_id: String,
        user_id: String,
        up: bool,
    },
    /// Pin a participant as the primary view, or clear with `null`.
    SpotlightSet {
        room_id: String,
        by_user_id: String,
        user_id: Option<String>,
    },
    /// Advertise or withdraw a local-recording indicator.
    Recording {
        room_id: String,
        user_id: String,
        on: bool,
    },
    /// Open a new multi-option poll.
    PollCreate {
        room_id: String,
        by_user_id: String,
        question: String,
        options: Vec<String>,
        #[serde(default)]
        poll_id: Option<String>,
    },
    /// Cast (or move) the caller's single ballot.
    PollVote {
        room_id: String,
        user_id: String,
        poll_id: String,
        option_index: usize,
    },
    /// Close a poll; there is no reopen.
    PollClose {
        room_id: String,
        by_user_id: String,
        poll_id: String,
    },
}

impl ClientMessage {
    /// The room this message is addressed to.
    pub fn room_id(&self) -> &str {
        match self {
            ClientMessage::Join { room_id, .. }
            | ClientMessage::Admit { room_id, .. }
            | ClientMessage::Deny { room_id, .. }
            | ClientMessage::AdmitAll { room_id, .. }
            | ClientMessage::Kick { room_id, .. }
            | ClientMessage::Mute { room_id, .. }
            | ClientMessage::MuteAll { room_id, .. }
            | ClientMessage::End { room_id, .. }
            | ClientMessage::LowerAllHands { room_id, .. }
            | ClientMessage::SetRole { room_id, .. }
            | ClientMessage::TransferHost { room_id, .. }
            | ClientMessage::Config { room_id, .. }
            | ClientMessage::Offer { room_id, .. }
            | ClientMessage::Answer { room_id, .. }
            | ClientMessage::Ice { room_id, .. }
            | ClientMessage::Chat { room_id, .. }
            | ClientMessage::Reaction { room_id, .. }
            | ClientMessage::Hand { room_id, .. }
            | ClientMessage::SpotlightSet { room_id, .. }
            | ClientMessage::Recording { room_id, .. }
            | ClientMessage::PollCreate { room_id, .. }
            | ClientMessage::PollVote { room_id, .. }
            | ClientMessage::PollClose { room_id, .. } => room_id,
        }
    }
}

/// Messages pushed from server to one client or to a whole room.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Admission refused; the only explicit failure on the wire.
    JoinDenied { room_id: String, reason: String },
    /// Waiting-list snapshot for the room.
    Waiting {
        room_id: String,
        waiting: Vec<WaitingEntry>,
    },
    /// The caller has been placed in the waiting list.
    WaitingYou { room_id: String },
    /// Full participants snapshot for the room.
    Participants {
        room_id: String,
        participants: Vec<ParticipantInfo>,
    },
    /// The caller has been admitted from the waiting list.
    Admitted { room_id: String, user_id: String },
    /// Notice to existing members that someone joined.
    UserJoined {
        room_id: String,
        user_id: String,
        name: String,
    },
    /// Notice that a participant left or was removed.
    UserLeft { room_id: String, user_id: String },
    /// Notice that the host role moved.
    HostChanged { room_id: String, host_id: String },
    /// A single participant was flagged muted.
    Muted { room_id: String, user_id: String },
    /// Every participant was flagged muted.
    MutedAll { room_id: String, by_user_id: String },
    /// Full policy-flag snapshot after a config change.
    ConfigUpdated {
        room_id: String,
        config: ConfigSnapshot,
    },
    /// Current spotlight target, `null` when cleared.
    Spotlight {
        room_id: String,
        user_id: Option<String>,
    },
    /// A local-recording indicator toggled.
    Recording {
        room_id: String,
        user_id: String,
        on: bool,
    },
    /// Full poll list snapshot.
    Polls {
        room_id: String,
        polls: Vec<PollSnapshot>,
    },
    /// Chat line with server timestamp (unix millis).
    Chat {
        room_id: String,
        user_id: String,
        text: String,
        ts: i64,
    },
    /// Reaction with server timestamp (unix millis).
    Reaction {
        room_id: String,
        user_id: String,
        emoji: String,
        ts: i64,
    },
    /// Hand raised/lowered flag, forwarded as-is.
    Hand {
        room_id: String,
        user_id: String,
        up: bool,
    },
    /// Per-participant reset signal from `lower-all-hands`.
    HandDown { room_id: String, user_id: String },
    /// Relayed connection-negotiation offer.
    Offer {
        room_id: String,
        to_user_id: String,
        from_user_id: String,
        sdp: String,
    },
    /// Relayed connection-negotiation answer.
    Answer {
        room_id: String,
        to_user_id: String,
        from_user_id: String,
        sdp: String,
    },
    /// Relayed ICE candidate.
    Ice {
        room_id: String,
        to_user_id: String,
        from_user_id: String,
        candidate: Value,
    },
    /// The room was ended and destroyed.
    Ended { room_id: String, by_user_id: String },
}

/// Reason string carried by `join-denied`.
pub const DENY_REASON_PASSCODE: &str = "passcode";
/// `join-denied` reason when a moderator removes a waiting user.
pub const DENY_REASON_DENIED: &str = "denied";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_round_trips_with_wire_names() {
        let json = r#"{"type":"join","roomId":"r1","userId":"u1","name":"Ada"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match &msg {
            ClientMessage::Join {
                room_id,
                user_id,
                name,
                passcode,
            } => {
                assert_eq!(room_id, "r1");
                assert_eq!(user_id, "u1");
                assert_eq!(name, "Ada");
                assert!(passcode.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
        assert_eq!(msg.room_id(), "r1");

        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back["type"], "join");
        assert_eq!(back["roomId"], "r1");
    }

    #[test]
    fn role_message_uses_role_tag() {
        let json = r#"{"type":"role","roomId":"r1","byUserId":"h","userId":"g","role":"cohost"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::SetRole {
                role: Role::Cohost,
                ..
            }
        ));
    }

    #[test]
    fn config_patch_flattens_into_message() {
        let json = r#"{"type":"config","roomId":"r1","byUserId":"h","lobby":true,"allowChat":false}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Config { patch, .. } => {
                assert_eq!(patch.lobby, Some(true));
                assert_eq!(patch.allow_chat, Some(false));
                assert!(patch.locked.is_none());
                assert!(patch.passcode.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn ice_candidate_payload_is_kept_verbatim() {
        let json = r#"{"type":"ice","roomId":"r1","toUserId":"b","fromUserId":"a",
                       "candidate":{"sdpMid":"0","candidate":"candidate:1 1 UDP"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Ice { candidate, .. } => {
                assert_eq!(candidate["sdpMid"], "0");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn server_messages_serialize_kebab_case() {
        let msg = ServerMessage::WaitingYou {
            room_id: "r1".into(),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "waiting-you");

        let msg = ServerMessage::HostChanged {
            room_id: "r1".into(),
            host_id: "u2".into(),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "host-changed");
        assert_eq!(v["hostId"], "u2");
    }

    #[test]
    fn spotlight_clear_serializes_null() {
        let msg = ServerMessage::Spotlight {
            room_id: "r1".into(),
            user_id: None,
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert!(v["userId"].is_null());
    }
}
