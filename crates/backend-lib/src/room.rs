// ============================
// crates/backend-lib/src/room.rs
// ============================
//! The `Room` aggregate: participants, waiting list, policy flags,
//! spotlight, recording indicators and polls for one active meeting.
//!
//! Everything here is synchronous and side-effect free; each operation
//! mutates the aggregate and returns a small outcome value that the
//! room actor translates into broadcasts. Unauthorized or invalid calls
//! return no-op outcomes and mutate nothing.

use std::collections::{HashMap, HashSet};

use huddle_common::{
    ConfigPatch, ConfigSnapshot, ParticipantInfo, PollOptionSnapshot, PollSnapshot, Role,
    WaitingEntry,
};
use uuid::Uuid;

/// Poll questions are truncated to this many characters.
pub const MAX_POLL_QUESTION_CHARS: usize = 200;
/// Poll option labels are truncated to this many characters.
pub const MAX_POLL_OPTION_CHARS: usize = 100;
/// Polls carry at most this many options; extras are discarded.
pub const MAX_POLL_OPTIONS: usize = 8;

/// One admitted member of a room.
#[derive(Debug, Clone)]
pub struct Participant {
    pub role: Role,
    /// Soft/informational flag, not an audio kill-switch.
    pub muted: bool,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct PollOption {
    pub text: String,
    pub voters: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct Poll {
    pub id: String,
    pub question: String,
    pub options: Vec<PollOption>,
    /// One-way flag; closed polls never reopen.
    pub closed: bool,
}

/// Room policy flags. New rooms start open with every `allow_*` on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    pub locked: bool,
    pub lobby: bool,
    /// Empty string means "no passcode".
    pub passcode: String,
    pub mute_on_join: bool,
    pub allow_chat: bool,
    pub allow_reactions: bool,
    pub allow_screen_share: bool,
    pub allow_local_recording: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            locked: false,
            lobby: false,
            passcode: String::new(),
            mute_on_join: false,
            allow_chat: true,
            allow_reactions: true,
            allow_screen_share: true,
            allow_local_recording: true,
        }
    }
}

/// Result of a join attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Wrong or missing passcode; the caller gets an explicit denial.
    DeniedPasscode,
    /// Placed in the waiting list, not yet admitted.
    Waiting,
    /// Admitted into the participants set.
    Joined { muted: bool },
}

/// What a removal (leave, kick, disconnect) touched besides the
/// participants set, so the actor knows which notices to broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaveEffects {
    pub was_participant: bool,
    pub was_waiting: bool,
    pub recording_stopped: bool,
    pub spotlight_cleared: bool,
    /// Set when the departing host's role passed to another participant.
    pub new_host: Option<String>,
}

/// A user moved from the waiting list into the participants set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedUser {
    pub user_id: String,
    pub name: String,
    pub muted: bool,
}

/// Ephemeral per-meeting aggregate, keyed by its externally provided id.
#[derive(Debug, Clone)]
pub struct Room {
    room_id: String,
    host_id: String,
    pub config: RoomConfig,
    participants: HashMap<String, Participant>,
    waiting: HashMap<String, String>,
    spotlight: Option<String>,
    recording: HashSet<String>,
    polls: Vec<Poll>,
}

impl Room {
    pub fn new(room_id: impl Into<String>, creator_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            host_id: creator_id.into(),
            config: RoomConfig::default(),
            participants: HashMap::new(),
            waiting: HashMap::new(),
            spotlight: None,
            recording: HashSet::new(),
            polls: Vec::new(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.contains_key(user_id)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn participant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.participants.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn spotlight(&self) -> Option<&str> {
        self.spotlight.as_deref()
    }

    pub fn recording_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.recording.iter().cloned().collect();
        ids.sort();
        ids
    }

    // ---- authorization guard ----

    /// Host or cohost. Gates every moderator action.
    pub fn can_moderate(&self, actor_id: &str) -> bool {
        actor_id == self.host_id
            || self
                .participants
                .get(actor_id)
                .is_some_and(|p| p.role == Role::Cohost)
    }

    /// Host only. Gates role changes, host transfer and end-meeting.
    pub fn is_host(&self, actor_id: &str) -> bool {
        actor_id == self.host_id
    }

    // ---- admission ----

    /// Admission workflow: passcode gate, then lobby/lock gate, then
    /// insertion into the participants set.
    pub fn join(&mut self, user_id: &str, name: &str, passcode: Option<&str>) -> JoinOutcome {
        // A rejoin by a current participant is idempotent.
        if let Some(p) = self.participants.get(user_id) {
            return JoinOutcome::Joined { muted: p.muted };
        }

        if !self.config.passcode.is_empty()
            && user_id != self.host_id
            && passcode != Some(self.config.passcode.as_str())
        {
            return JoinOutcome::DeniedPasscode;
        }

        if (self.config.locked || self.config.lobby) && user_id != self.host_id {
            self.waiting.insert(user_id.to_string(), name.to_string());
            return JoinOutcome::Waiting;
        }

        self.insert_participant(user_id, name)
    }

    fn insert_participant(&mut self, user_id: &str, name: &str) -> JoinOutcome {
        self.waiting.remove(user_id);

        // Rooms are never garbage collected on empty; whoever joins an
        // abandoned room takes over as host so host_id cannot dangle.
        if self.participants.is_empty() {
            self.host_id = user_id.to_string();
        }

        let is_host = user_id == self.host_id;
        let muted = self.config.mute_on_join && !is_host;
        self.participants.insert(
            user_id.to_string(),
            Participant {
                role: if is_host { Role::Host } else { Role::Guest },
                muted,
                name: name.to_string(),
            },
        );
        JoinOutcome::Joined { muted }
    }

    /// Move one user from `waiting` into `participants`.
    pub fn admit(&mut self, by_user_id: &str, user_id: &str) -> Option<AdmittedUser> {
        if !self.can_moderate(by_user_id) {
            return None;
        }
        let name = self.waiting.remove(user_id)?;
        let JoinOutcome::Joined { muted } = self.insert_participant(user_id, &name) else {
            return None;
        };
        Some(AdmittedUser {
            user_id: user_id.to_string(),
            name,
            muted,
        })
    }

    /// Remove one user from `waiting` without admitting them.
    pub fn deny(&mut self, by_user_id: &str, user_id: &str) -> bool {
        if !self.can_moderate(by_user_id) {
            return false;
        }
        self.waiting.remove(user_id).is_some()
    }

    /// Drain the whole waiting list in one pass, admitting everyone.
    pub fn admit_all(&mut self, by_user_id: &str) -> Vec<AdmittedUser> {
        if !self.can_moderate(by_user_id) {
            return Vec::new();
        }
        let mut pending: Vec<(String, String)> = self.waiting.drain().collect();
        pending.sort();
        let mut admitted = Vec::with_capacity(pending.len());
        for (user_id, name) in pending {
            if let JoinOutcome::Joined { muted } = self.insert_participant(&user_id, &name) {
                admitted.push(AdmittedUser {
                    user_id,
                    name,
                    muted,
                });
            }
        }
        admitted
    }

    /// Remove a user from the room (leave or disconnect cleanup),
    /// clearing any spotlight/recording state that pointed at them.
    pub fn leave(&mut self, user_id: &str) -> LeaveEffects {
        let mut fx = LeaveEffects {
            was_waiting: self.waiting.remove(user_id).is_some(),
            ..LeaveEffects::default()
        };
        if self.participants.remove(user_id).is_none() {
            return fx;
        }
        fx.was_participant = true;
        fx.recording_stopped = self.recording.remove(user_id);
        if self.spotlight.as_deref() == Some(user_id) {
            self.spotlight = None;
            fx.spotlight_cleared = true;
        }
        if user_id == self.host_id {
            fx.new_host = self.promote_successor();
        }
        fx
    }

    /// When the host departs with members still present, the host role
    /// passes to a cohost if one exists, otherwise to any participant.
    fn promote_successor(&mut self) -> Option<String> {
        let mut candidates: Vec<(&String, &Participant)> = self.participants.iter().collect();
        candidates.sort_by_key(|(id, _)| (*id).clone());
        let successor = candidates
            .iter()
            .find(|(_, p)| p.role == Role::Cohost)
            .or_else(|| candidates.first())
            .map(|(id, _)| (*id).clone())?;
        self.host_id = successor.clone();
        if let Some(p) = self.participants.get_mut(&successor) {
            p.role = Role::Host;
        }
        Some(successor)
    }

    /// Forcible removal. The host cannot be kicked.
    pub fn kick(&mut self, by_user_id: &str, user_id: &str) -> Option<LeaveEffects> {
        if !self.can_moderate(by_user_id) || user_id == self.host_id {
            return None;
        }
        let fx = self.leave(user_id);
        fx.was_participant.then_some(fx)
    }

    // ---- moderation ----

    pub fn mute(&mut self, by_user_id: &str, user_id: &str) -> bool {
        if !self.can_moderate(by_user_id) {
            return false;
        }
        match self.participants.get_mut(user_id) {
            Some(p) => {
                p.muted = true;
                true
            }
            None => false,
        }
    }

    pub fn mute_all(&mut self, by_user_id: &str) -> bool {
        if !self.can_moderate(by_user_id) {
            return false;
        }
        for p in self.participants.values_mut() {
            p.muted = true;
        }
        true
    }

    /// Host-only role change between guest and cohost. The host's own
    /// role only moves via [`Room::transfer_host`].
    pub fn set_role(&mut self, by_user_id: &str, user_id: &str, role: Role) -> bool {
        if !self.is_host(by_user_id) || role == Role::Host || user_id == self.host_id {
            return false;
        }
        match self.participants.get_mut(user_id) {
            Some(p) => {
                p.role = role;
                true
            }
            None => false,
        }
    }

    /// Atomic host handoff: exactly one host before and after.
    pub fn transfer_host(&mut self, by_user_id: &str, user_id: &str) -> bool {
        if !self.is_host(by_user_id) || user_id == by_user_id || !self.is_participant(user_id) {
            return false;
        }
        if let Some(prev) = self.participants.get_mut(by_user_id) {
            prev.role = Role::Cohost;
        }
        if let Some(next) = self.participants.get_mut(user_id) {
            next.role = Role::Host;
        }
        self.host_id = user_id.to_string();
        true
    }

    /// Merge the fields present in the patch into the policy flags.
    pub fn apply_config(&mut self, by_user_id: &str, patch: &ConfigPatch) -> bool {
        if !self.can_moderate(by_user_id) {
            return false;
        }
        let c = &mut self.config;
        if let Some(v) = patch.lobby {
            c.lobby = v;
        }
        if let Some(v) = patch.locked {
            c.locked = v;
        }
        if let Some(v) = &patch.passcode {
            c.passcode = v.clone();
        }
        if let Some(v) = patch.mute_on_join {
            c.mute_on_join = v;
        }
        if let Some(v) = patch.allow_chat {
            c.allow_chat = v;
        }
        if let Some(v) = patch.allow_reactions {
            c.allow_reactions = v;
        }
        if let Some(v) = patch.allow_screen_share {
            c.allow_screen_share = v;
        }
        if let Some(v) = patch.allow_local_recording {
            c.allow_local_recording = v;
        }
        true
    }

    // ---- spotlight & recording indicators ----

    /// Pin a current participant as primary view, or clear with `None`.
    /// Referencing a non-participant is ignored.
    pub fn set_spotlight(&mut self, by_user_id: &str, user_id: Option<&str>) -> bool {
        if !self.can_moderate(by_user_id) {
            return false;
        }
        match user_id {
            Some(id) if !self.is_participant(id) => false,
            Some(id) => {
                self.spotlight = Some(id.to_string());
                true
            }
            None => {
                self.spotlight = None;
                true
            }
        }
    }

    /// Toggle the caller's local-recording indicator. Allowed when the
    /// room permits local recording or the caller is a moderator.
    pub fn set_recording(&mut self, user_id: &str, on: bool) -> bool {
        if !self.is_participant(user_id) {
            return false;
        }
        if !self.config.allow_local_recording && !self.can_moderate(user_id) {
            return false;
        }
        if on {
            self.recording.insert(user_id.to_string());
        } else {
            self.recording.remove(user_id);
        }
        true
    }

    // ---- ancillary signal gates ----

    pub fn chat_allowed(&self, user_id: &str) -> bool {
        self.is_participant(user_id) && (self.config.allow_chat || self.can_moderate(user_id))
    }

    pub fn reaction_allowed(&self, user_id: &str) -> bool {
        self.is_participant(user_id) && (self.config.allow_reactions || self.can_moderate(user_id))
    }

    // ---- polls ----

    fn truncate_chars(s: &str, max: usize) -> String {
        s.chars().take(max).collect()
    }

    /// Open a new poll with up to [`MAX_POLL_OPTIONS`] options, each
    /// with an empty voter set. Returns the poll id.
    pub fn create_poll(
        &mut self,
        by_user_id: &str,
        question: &str,
        options: &[String],
        poll_id: Option<String>,
    ) -> Option<String> {
        if !self.can_moderate(by_user_id) {
            return None;
        }
        let id = poll_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let options = options
            .iter()
            .take(MAX_POLL_OPTIONS)
            .map(|text| PollOption {
                text: Self::truncate_chars(text, MAX_POLL_OPTION_CHARS),
                voters: HashSet::new(),
            })
            .collect();
        self.polls.push(Poll {
            id: id.clone(),
            question: Self::truncate_chars(question, MAX_POLL_QUESTION_CHARS),
            options,
            closed: false,
        });
        Some(id)
    }

    /// Cast the caller's ballot, moving it if one was already placed.
    /// No-op for missing/closed polls or an out-of-range option.
    pub fn vote(&mut self, user_id: &str, poll_id: &str, option_index: usize) -> bool {
        if !self.is_participant(user_id) {
            return false;
        }
        let Some(poll) = self.polls.iter_mut().find(|p| p.id == poll_id) else {
            return false;
        };
        if poll.closed || option_index >= poll.options.len() {
            return false;
        }
        for option in &mut poll.options {
            option.voters.remove(user_id);
        }
        if let Some(option) = poll.options.get_mut(option_index) {
            option.voters.insert(user_id.to_string());
        }
        true
    }

    /// One-way close; there is no reopen.
    pub fn close_poll(&mut self, by_user_id: &str, poll_id: &str) -> bool {
        if !self.can_moderate(by_user_id) {
            return false;
        }
        match self.polls.iter_mut().find(|p| p.id == poll_id) {
            Some(poll) => {
                poll.closed = true;
                true
            }
            None => false,
        }
    }

    // ---- snapshots ----

    pub fn participants_snapshot(&self) -> Vec<ParticipantInfo> {
        let mut list: Vec<ParticipantInfo> = self
            .participants
            .iter()
            .map(|(user_id, p)| ParticipantInfo {
                user_id: user_id.clone(),
                role: p.role,
                muted: p.muted,
                name: p.name.clone(),
            })
            .collect();
        list.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        list
    }

    pub fn waiting_snapshot(&self) -> Vec<WaitingEntry> {
        let mut list: Vec<WaitingEntry> = self
            .waiting
            .iter()
            .map(|(user_id, name)| WaitingEntry {
                user_id: user_id.clone(),
                name: name.clone(),
            })
            .collect();
        list.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        list
    }

    pub fn polls_snapshot(&self) -> Vec<PollSnapshot> {
        self.polls
            .iter()
            .map(|p| PollSnapshot {
                id: p.id.clone(),
                question: p.question.clone(),
                options: p
                    .options
                    .iter()
                    .map(|o| PollOptionSnapshot {
                        text: o.text.clone(),
                        votes: o.voters.len(),
                    })
                    .collect(),
                closed: p.closed,
            })
            .collect()
    }

    pub fn config_snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            lobby: self.config.lobby,
            locked: self.config.locked,
            passcode_set: !self.config.passcode.is_empty(),
            mute_on_join: self.config.mute_on_join,
            allow_chat: self.config.allow_chat,
            allow_reactions: self.config.allow_reactions,
            allow_screen_share: self.config.allow_screen_share,
            allow_local_recording: self.config.allow_local_recording,
        }
    }
}
