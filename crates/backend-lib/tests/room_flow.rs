//! End-to-end room flows through the manager and actor handles,
//! without the WebSocket transport.
use huddle_backend_lib::registry::ConnectionRegistry;
use huddle_backend_lib::room_actor::{ActorOptions, RoomCommand, RoomHandle};
use huddle_backend_lib::rooms::RoomManager;
use huddle_common::{ConfigPatch, Role, ServerMessage};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};

struct Client {
    rx: mpsc::Receiver<ServerMessage>,
}

impl Client {
    async fn expect<F>(&mut self, mut pred: F) -> ServerMessage
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        timeout(Duration::from_secs(1), async {
            loop {
                let msg = self.rx.recv().await.expect("channel closed while waiting");
                if pred(&msg) {
                    return msg;
                }
            }
        })
        .await
        .expect("timed out waiting for message")
    }
}

fn join(handle: &RoomHandle, user_id: &str, name: &str, passcode: Option<&str>) -> Client {
    let (tx, rx) = mpsc::channel(64);
    handle.send(RoomCommand::Join {
        user_id: user_id.into(),
        name: name.into(),
        passcode: passcode.map(str::to_string),
        tx,
    });
    Client { rx }
}

#[tokio::test]
async fn lobby_admission_flow() {
    let manager = RoomManager::new(ActorOptions::default(), ConnectionRegistry::new());
    let handle = manager.get_or_create("standup", "host");
    let mut host = join(&handle, "host", "Host", None);
    host.expect(|m| matches!(m, ServerMessage::Participants { .. }))
        .await;

    handle.send(RoomCommand::Config {
        by_user_id: "host".into(),
        patch: ConfigPatch {
            lobby: Some(true),
            ..ConfigPatch::default()
        },
    });
    host.expect(|m| matches!(m, ServerMessage::ConfigUpdated { config, .. } if config.lobby))
        .await;

    let mut alice = join(&handle, "alice", "Alice", None);
    let mut bob = join(&handle, "bob", "Bob", None);
    alice
        .expect(|m| matches!(m, ServerMessage::WaitingYou { .. }))
        .await;
    bob.expect(|m| matches!(m, ServerMessage::WaitingYou { .. }))
        .await;
    host.expect(
        |m| matches!(m, ServerMessage::Waiting { waiting, .. } if waiting.len() == 2),
    )
    .await;

    handle.send(RoomCommand::AdmitAll {
        by_user_id: "host".into(),
    });
    alice
        .expect(|m| matches!(m, ServerMessage::Admitted { user_id, .. } if user_id == "alice"))
        .await;
    bob.expect(|m| matches!(m, ServerMessage::Admitted { user_id, .. } if user_id == "bob"))
        .await;
    host.expect(
        |m| matches!(m, ServerMessage::Waiting { waiting, .. } if waiting.is_empty()),
    )
    .await;
    host.expect(
        |m| matches!(m, ServerMessage::Participants { participants, .. } if participants.len() == 3),
    )
    .await;
}

#[tokio::test]
async fn poll_lifecycle_with_moving_ballot() {
    let manager = RoomManager::new(ActorOptions::default(), ConnectionRegistry::new());
    let handle = manager.get_or_create("retro", "host");
    let mut host = join(&handle, "host", "Host", None);
    let mut guest = join(&handle, "guest", "Guest", None);
    guest
        .expect(|m| matches!(m, ServerMessage::Participants { participants, .. } if participants.len() == 2))
        .await;

    handle.send(RoomCommand::PollCreate {
        by_user_id: "host".into(),
        question: "Keep or change?".into(),
        options: vec!["keep".into(), "change".into()],
        poll_id: Some("p1".into()),
    });
    host.expect(|m| matches!(m, ServerMessage::Polls { polls, .. } if polls.len() == 1))
        .await;

    handle.send(RoomCommand::PollVote {
        user_id: "guest".into(),
        poll_id: "p1".into(),
        option_index: 0,
    });
    guest
        .expect(|m| {
            matches!(m, ServerMessage::Polls { polls, .. }
                if polls.len() == 1 && polls[0].options[0].votes == 1 && polls[0].options[1].votes == 0)
        })
        .await;

    // Re-voting moves the single ballot, it does not add one.
    handle.send(RoomCommand::PollVote {
        user_id: "guest".into(),
        poll_id: "p1".into(),
        option_index: 1,
    });
    guest
        .expect(|m| {
            matches!(m, ServerMessage::Polls { polls, .. }
                if polls.len() == 1 && polls[0].options[0].votes == 0 && polls[0].options[1].votes == 1)
        })
        .await;

    handle.send(RoomCommand::PollClose {
        by_user_id: "host".into(),
        poll_id: "p1".into(),
    });
    guest
        .expect(|m| matches!(m, ServerMessage::Polls { polls, .. } if polls.len() == 1 && polls[0].closed))
        .await;

    // Votes on a closed poll change nothing, so no snapshot goes out.
    handle.send(RoomCommand::PollVote {
        user_id: "guest".into(),
        poll_id: "p1".into(),
        option_index: 0,
    });
    handle.send(RoomCommand::Chat {
        user_id: "host".into(),
        text: "marker".into(),
    });
    let msg = guest
        .expect(|m| matches!(m, ServerMessage::Polls { .. } | ServerMessage::Chat { .. }))
        .await;
    assert!(matches!(msg, ServerMessage::Chat { .. }));
}

#[tokio::test]
async fn host_transfer_then_old_host_leaves() {
    let manager = RoomManager::new(ActorOptions::default(), ConnectionRegistry::new());
    let handle = manager.get_or_create("sync", "host");
    let mut host = join(&handle, "host", "Host", None);
    let mut next = join(&handle, "next", "Next", None);
    next.expect(|m| matches!(m, ServerMessage::Participants { participants, .. } if participants.len() == 2))
        .await;

    handle.send(RoomCommand::TransferHost {
        by_user_id: "host".into(),
        user_id: "next".into(),
    });
    next.expect(|m| matches!(m, ServerMessage::HostChanged { host_id, .. } if host_id == "next"))
        .await;
    let msg = host
        .expect(|m| {
            matches!(m, ServerMessage::Participants { participants, .. }
                if participants.iter().any(|p| p.user_id == "next" && p.role == Role::Host))
        })
        .await;
    let ServerMessage::Participants { participants, .. } = msg else {
        unreachable!()
    };
    let hosts: Vec<_> = participants
        .iter()
        .filter(|p| p.role == Role::Host)
        .collect();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].user_id, "next");
    // The previous host steps down to cohost.
    assert!(participants
        .iter()
        .any(|p| p.user_id == "host" && p.role == Role::Cohost));

    handle.send(RoomCommand::Leave {
        user_id: "host".into(),
    });
    next.expect(|m| matches!(m, ServerMessage::UserLeft { user_id, .. } if user_id == "host"))
        .await;

    // The remaining host can still moderate.
    handle.send(RoomCommand::MuteAll {
        by_user_id: "next".into(),
    });
    next.expect(|m| matches!(m, ServerMessage::MutedAll { by_user_id, .. } if by_user_id == "next"))
        .await;
}

#[tokio::test]
async fn end_meeting_discards_state_and_allows_recreate() {
    let manager = RoomManager::new(ActorOptions::default(), ConnectionRegistry::new());
    let handle = manager.get_or_create("allhands", "host");
    let mut host = join(&handle, "host", "Host", None);
    host.expect(|m| matches!(m, ServerMessage::Participants { .. }))
        .await;

    handle.send(RoomCommand::PollCreate {
        by_user_id: "host".into(),
        question: "q".into(),
        options: vec!["a".into(), "b".into()],
        poll_id: Some("p1".into()),
    });
    host.expect(|m| matches!(m, ServerMessage::Polls { polls, .. } if polls.len() == 1))
        .await;

    handle.send(RoomCommand::End {
        by_user_id: "host".into(),
    });
    host.expect(|m| matches!(m, ServerMessage::Ended { .. }))
        .await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !handle.is_closed() {
        assert!(tokio::time::Instant::now() < deadline, "actor did not stop");
        sleep(Duration::from_millis(5)).await;
    }

    // A fresh join recreates the room from scratch.
    let fresh = manager.get_or_create("allhands", "late");
    let mut late = join(&fresh, "late", "Late", None);
    let msg = late
        .expect(|m| matches!(m, ServerMessage::Participants { .. }))
        .await;
    assert!(
        matches!(msg, ServerMessage::Participants { participants, .. }
            if participants.len() == 1 && participants[0].role == Role::Host)
    );
    let msg = late
        .expect(|m| matches!(m, ServerMessage::Polls { .. }))
        .await;
    assert!(matches!(msg, ServerMessage::Polls { polls, .. } if polls.is_empty()));
}

#[tokio::test]
async fn mute_on_join_and_kick() {
    let manager = RoomManager::new(ActorOptions::default(), ConnectionRegistry::new());
    let handle = manager.get_or_create("class", "host");
    let mut host = join(&handle, "host", "Host", None);
    host.expect(|m| matches!(m, ServerMessage::Participants { .. }))
        .await;

    handle.send(RoomCommand::Config {
        by_user_id: "host".into(),
        patch: ConfigPatch {
            mute_on_join: Some(true),
            ..ConfigPatch::default()
        },
    });
    host.expect(|m| matches!(m, ServerMessage::ConfigUpdated { config, .. } if config.mute_on_join))
        .await;

    let mut pupil = join(&handle, "pupil", "Pupil", None);
    host.expect(|m| matches!(m, ServerMessage::Muted { user_id, .. } if user_id == "pupil"))
        .await;
    pupil
        .expect(|m| {
            matches!(m, ServerMessage::Participants { participants, .. }
                if participants.iter().any(|p| p.user_id == "pupil" && p.muted))
        })
        .await;

    // A guest cannot kick; the host can.
    handle.send(RoomCommand::Kick {
        by_user_id: "pupil".into(),
        user_id: "host".into(),
    });
    handle.send(RoomCommand::Kick {
        by_user_id: "host".into(),
        user_id: "pupil".into(),
    });
    pupil
        .expect(|m| matches!(m, ServerMessage::UserLeft { user_id, .. } if user_id == "pupil"))
        .await;
    host.expect(
        |m| matches!(m, ServerMessage::Participants { participants, .. } if participants.len() == 1),
    )
    .await;
}

#[tokio::test]
async fn passcode_gate_and_host_bypass() {
    let manager = RoomManager::new(ActorOptions::default(), ConnectionRegistry::new());
    let handle = manager.get_or_create("private", "host");
    let mut host = join(&handle, "host", "Host", None);
    host.expect(|m| matches!(m, ServerMessage::Participants { .. }))
        .await;

    handle.send(RoomCommand::Config {
        by_user_id: "host".into(),
        patch: ConfigPatch {
            passcode: Some("sesame".into()),
            ..ConfigPatch::default()
        },
    });
    host.expect(|m| matches!(m, ServerMessage::ConfigUpdated { config, .. } if config.passcode_set))
        .await;

    let mut wrong = join(&handle, "wrong", "Wrong", Some("open"));
    wrong
        .expect(|m| matches!(m, ServerMessage::JoinDenied { reason, .. } if reason == "passcode"))
        .await;

    let mut right = join(&handle, "right", "Right", Some("sesame"));
    right
        .expect(|m| matches!(m, ServerMessage::Participants { participants, .. } if participants.len() == 2))
        .await;
}

#[tokio::test]
async fn waiting_user_receives_no_room_traffic_until_admitted() {
    let manager = RoomManager::new(ActorOptions::default(), ConnectionRegistry::new());
    let handle = manager.get_or_create("townhall", "host");
    let mut host = join(&handle, "host", "Host", None);
    host.expect(|m| matches!(m, ServerMessage::Participants { .. }))
        .await;

    handle.send(RoomCommand::Config {
        by_user_id: "host".into(),
        patch: ConfigPatch {
            lobby: Some(true),
            ..ConfigPatch::default()
        },
    });
    host.expect(|m| matches!(m, ServerMessage::ConfigUpdated { config, .. } if config.lobby))
        .await;

    let mut lurker = join(&handle, "lurker", "Lurker", None);
    lurker
        .expect(|m| matches!(m, ServerMessage::WaitingYou { .. }))
        .await;

    // Room traffic while the lurker is still in the lobby.
    handle.send(RoomCommand::Chat {
        user_id: "host".into(),
        text: "private to admitted members".into(),
    });
    handle.send(RoomCommand::Reaction {
        user_id: "host".into(),
        emoji: "wave".into(),
    });
    host.expect(|m| matches!(m, ServerMessage::Chat { .. }))
        .await;
    host.expect(|m| matches!(m, ServerMessage::Reaction { .. }))
        .await;

    handle.send(RoomCommand::Admit {
        by_user_id: "host".into(),
        user_id: "lurker".into(),
    });
    // The first room-scoped message the lurker ever sees is its own
    // admission; the chat and reaction never reached the lobby.
    let msg = lurker
        .expect(|m| {
            matches!(
                m,
                ServerMessage::Chat { .. }
                    | ServerMessage::Reaction { .. }
                    | ServerMessage::Participants { .. }
                    | ServerMessage::Polls { .. }
                    | ServerMessage::ConfigUpdated { .. }
                    | ServerMessage::Admitted { .. }
            )
        })
        .await;
    assert!(matches!(msg, ServerMessage::Admitted { user_id, .. } if user_id == "lurker"));
}
