use parley_relay::{
    ClientEvent, ConnectionState, Dispatch, DropReason, Registration, RelayConnection,
    RelayServer, SendMessage, ServerEvent, Typing,
};
use serde_json::json;
use tokio::sync::mpsc;

struct Client {
    connection: RelayConnection,
    inbox: mpsc::Receiver<ServerEvent>,
}

impl Client {
    /// Everything queued for this client so far.
    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.inbox.try_recv() {
            events.push(event);
        }
        events
    }

    /// Queued events other than presence snapshots.
    fn drain_direct(&mut self) -> Vec<ServerEvent> {
        self.drain()
            .into_iter()
            .filter(|event| !matches!(event, ServerEvent::Presence(_)))
            .collect()
    }
}

async fn connect(relay: &RelayServer) -> Client {
    let (connection, inbox) = relay.connect(None).await;
    Client { connection, inbox }
}

async fn connect_as(relay: &RelayServer, user: &str) -> Client {
    let mut client = connect(relay).await;
    let outcome = relay
        .dispatch(&mut client.connection, ClientEvent::Identify(user.into()))
        .await;
    assert!(matches!(outcome, Dispatch::Registered(_)));
    client
}

fn message(from: &str, to: &str, content: &str) -> ClientEvent {
    ClientEvent::SendMessage(SendMessage {
        sender_id: from.into(),
        receiver_id: to.into(),
        content: content.into(),
        message_id: Some(format!("{from}-1")),
    })
}

fn typing(from: &str, to: &str) -> Typing {
    Typing {
        sender_id: from.into(),
        receiver_id: to.into(),
    }
}

fn presence_users(event: &ServerEvent) -> Vec<String> {
    match event {
        ServerEvent::Presence(users) => users.iter().map(|u| u.user_id.clone()).collect(),
        other => panic!("expected presence, got {other:?}"),
    }
}

#[tokio::test]
async fn message_to_online_receiver_is_forwarded_immediately() {
    let relay = RelayServer::new(16);
    let mut alice = connect_as(&relay, "alice").await;
    let mut bob = connect_as(&relay, "bob").await;
    bob.drain();

    let outcome = relay
        .dispatch(&mut alice.connection, message("alice", "bob", "hi"))
        .await;
    assert_eq!(outcome, Dispatch::Forwarded);

    let events = bob.drain_direct();
    assert_eq!(events.len(), 1);
    let ServerEvent::Message(delivered) = &events[0] else {
        panic!("expected getMessage, got {:?}", events[0]);
    };
    assert_eq!(delivered.sender_id, "alice");
    assert_eq!(delivered.content, "hi");
    assert_eq!(delivered.message_id.as_deref(), Some("alice-1"));
    assert!(chrono::DateTime::parse_from_rfc3339(&delivered.timestamp).is_ok());

    assert!(alice.drain_direct().is_empty(), "sender gets no echo");
}

#[tokio::test]
async fn message_to_offline_receiver_is_dropped_silently() {
    let relay = RelayServer::new(16);
    let mut alice = connect_as(&relay, "alice").await;
    alice.drain();

    let outcome = relay
        .dispatch(&mut alice.connection, message("alice", "bob", "hello"))
        .await;

    assert_eq!(outcome, Dispatch::Dropped(DropReason::RecipientOffline));
    assert!(alice.drain().is_empty(), "no delivery failure is reported back");
}

#[tokio::test]
async fn typing_events_follow_the_receiver() {
    let relay = RelayServer::new(16);
    let mut alice = connect_as(&relay, "alice").await;
    let mut bob = connect_as(&relay, "bob").await;
    bob.drain();

    relay
        .dispatch(&mut alice.connection, ClientEvent::TypingStart(typing("alice", "bob")))
        .await;
    relay
        .dispatch(&mut alice.connection, ClientEvent::TypingStop(typing("alice", "bob")))
        .await;

    assert_eq!(
        bob.drain_direct(),
        vec![
            ServerEvent::TypingStart(typing("alice", "bob")),
            ServerEvent::TypingStop(typing("alice", "bob")),
        ]
    );

    let outcome = relay
        .dispatch(&mut alice.connection, ClientEvent::TypingStart(typing("alice", "carol")))
        .await;
    assert_eq!(outcome, Dispatch::Dropped(DropReason::RecipientOffline));
}

#[tokio::test]
async fn reconnect_routes_to_newest_connection() {
    let relay = RelayServer::new(16);
    let mut alice = connect_as(&relay, "alice").await;
    let mut stale = connect_as(&relay, "bob").await;
    let mut fresh = connect(&relay).await;

    let outcome = relay
        .dispatch(&mut fresh.connection, ClientEvent::Identify("bob".into()))
        .await;
    assert_eq!(
        outcome,
        Dispatch::Registered(Registration::Replaced {
            previous: stale.connection.id()
        })
    );
    stale.drain();
    fresh.drain();

    relay
        .dispatch(&mut alice.connection, message("alice", "bob", "are you there"))
        .await;
    assert_eq!(fresh.drain_direct().len(), 1);
    assert!(stale.drain_direct().is_empty());

    // The old socket finally closing must not take bob offline.
    relay.disconnect(&mut stale.connection).await;
    assert_eq!(relay.online_users().await, vec!["alice", "bob"]);
    assert!(fresh.drain().is_empty(), "no presence change, no broadcast");
}

#[tokio::test]
async fn disconnect_takes_user_offline_and_broadcasts() {
    let relay = RelayServer::new(16);
    let mut alice = connect_as(&relay, "alice").await;
    let mut bob = connect_as(&relay, "bob").await;
    alice.drain();

    relay.disconnect(&mut bob.connection).await;
    assert_eq!(bob.connection.state(), &ConnectionState::Closed);
    assert!(relay.registry().lookup("bob").await.is_none());

    let events = alice.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(presence_users(&events[0]), vec!["alice"]);

    // Closing twice is harmless.
    relay.disconnect(&mut bob.connection).await;
    assert!(alice.drain().is_empty());

    let outcome = relay
        .dispatch(&mut bob.connection, message("bob", "alice", "ghost"))
        .await;
    assert_eq!(outcome, Dispatch::Ignored);
}

#[tokio::test]
async fn identify_broadcasts_presence_to_every_connection() {
    let relay = RelayServer::new(16);
    let mut watcher = connect(&relay).await;
    let mut alice = connect_as(&relay, "alice").await;
    let _bob = connect_as(&relay, "bob").await;

    let watched = watcher.drain();
    assert_eq!(watched.len(), 2);
    assert_eq!(presence_users(&watched[0]), vec!["alice"]);
    assert_eq!(presence_users(&watched[1]), vec!["alice", "bob"]);

    let seen = alice.drain();
    assert_eq!(presence_users(seen.last().unwrap()), vec!["alice", "bob"]);
}

#[tokio::test]
async fn repeated_identify_keeps_single_entry() {
    let relay = RelayServer::new(16);
    let mut alice = connect_as(&relay, "alice").await;

    let outcome = relay
        .dispatch(&mut alice.connection, ClientEvent::Identify("alice".into()))
        .await;
    assert_eq!(outcome, Dispatch::Registered(Registration::Unchanged));
    assert_eq!(relay.online_users().await, vec!["alice"]);
    assert_eq!(relay.registry().len().await, 1);
}

#[tokio::test]
async fn unidentified_connection_events_are_ignored() {
    let relay = RelayServer::new(16);
    let mut bob = connect_as(&relay, "bob").await;
    let mut anonymous = connect(&relay).await;
    bob.drain();

    for event in [
        message("mallory", "bob", "hi"),
        ClientEvent::TypingStart(typing("mallory", "bob")),
        ClientEvent::TypingStop(typing("mallory", "bob")),
    ] {
        let outcome = relay.dispatch(&mut anonymous.connection, event).await;
        assert_eq!(outcome, Dispatch::Ignored);
    }
    assert!(bob.drain().is_empty());
    assert_eq!(anonymous.connection.state(), &ConnectionState::Unidentified);
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_closing() {
    let relay = RelayServer::new(16);
    let mut alice = connect_as(&relay, "alice").await;
    let mut bob = connect_as(&relay, "bob").await;
    bob.drain();

    for frame in ["{", r#"{"event":"sendMessage","data":42}"#, r#"{"event":"nope"}"#] {
        assert!(relay.handle_frame(&mut alice.connection, frame).await.is_none());
    }
    assert!(alice.connection.is_identified());

    let frame = json!({
        "event": "sendMessage",
        "data": {"senderId": "alice", "receiverId": "bob", "content": "still here"}
    })
    .to_string();
    let outcome = relay.handle_frame(&mut alice.connection, &frame).await;
    assert_eq!(outcome, Some(Dispatch::Forwarded));
    assert_eq!(bob.drain_direct().len(), 1);
}

#[tokio::test]
async fn spoofed_sender_and_blank_content_are_dropped() {
    let relay = RelayServer::new(16);
    let mut alice = connect_as(&relay, "alice").await;
    let mut bob = connect_as(&relay, "bob").await;
    let _carol = connect_as(&relay, "carol").await;
    bob.drain();

    let outcome = relay
        .dispatch(&mut alice.connection, message("carol", "bob", "it's carol"))
        .await;
    assert_eq!(outcome, Dispatch::Dropped(DropReason::SenderMismatch));

    let outcome = relay
        .dispatch(&mut alice.connection, ClientEvent::TypingStart(typing("carol", "bob")))
        .await;
    assert_eq!(outcome, Dispatch::Dropped(DropReason::SenderMismatch));

    let outcome = relay
        .dispatch(&mut alice.connection, message("alice", "bob", "   "))
        .await;
    assert_eq!(outcome, Dispatch::Dropped(DropReason::EmptyContent));

    assert!(bob.drain().is_empty());
}

#[tokio::test]
async fn authenticated_connection_cannot_claim_another_identity() {
    let relay = RelayServer::new(16);
    let (mut connection, _inbox) = relay.connect(Some("alice".into())).await;

    let outcome = relay
        .dispatch(&mut connection, ClientEvent::Identify("bob".into()))
        .await;
    assert_eq!(outcome, Dispatch::Dropped(DropReason::IdentityMismatch));
    assert_eq!(connection.state(), &ConnectionState::Unidentified);

    let outcome = relay
        .dispatch(&mut connection, ClientEvent::Identify("alice".into()))
        .await;
    assert_eq!(outcome, Dispatch::Registered(Registration::Inserted));
    assert_eq!(connection.user_id(), Some("alice"));
}

#[tokio::test]
async fn full_outbound_queue_drops_instead_of_blocking() {
    let relay = RelayServer::new(1);
    let mut alice = connect_as(&relay, "alice").await;
    let mut bob = connect_as(&relay, "bob").await;
    bob.drain();

    assert_eq!(
        relay
            .dispatch(&mut alice.connection, message("alice", "bob", "one"))
            .await,
        Dispatch::Forwarded
    );
    assert_eq!(
        relay
            .dispatch(&mut alice.connection, message("alice", "bob", "two"))
            .await,
        Dispatch::Dropped(DropReason::Undeliverable)
    );
    assert_eq!(bob.drain_direct().len(), 1);
}

#[tokio::test]
async fn connection_count_tracks_open_connections() {
    let relay = RelayServer::new(4);
    let mut first = connect(&relay).await;
    let _second = connect(&relay).await;
    assert_eq!(relay.connection_count().await, 2);

    relay.disconnect(&mut first.connection).await;
    assert_eq!(relay.connection_count().await, 1);
    assert!(relay.online_users().await.is_empty());
}
