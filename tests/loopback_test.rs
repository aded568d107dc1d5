//! Two managers chatting over the in-process transport.

use std::time::Duration;
use tokio::sync::mpsc;

use meshlink::delivery::{frame, DeliveryStatus, DeliveryTracker, DeliveryUpdate, ACK_TOKEN};
use meshlink::transport::{MemoryNetwork, MemoryTransport};
use meshlink::{ConnectionState, LinkEvent, LinkManager, LinkSettings, PeerIdentity};

async fn next(events: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

async fn wait_for_state(events: &mut mpsc::UnboundedReceiver<LinkEvent>, wanted: ConnectionState) {
    loop {
        if next(events).await.state() == Some(wanted) {
            return;
        }
    }
}

fn node(network: &MemoryNetwork, address: &str, name: &str) -> LinkManager<MemoryTransport> {
    let transport = network.transport(PeerIdentity::new(address).with_name(name));
    LinkManager::new(transport, LinkSettings::default())
}

#[tokio::test]
async fn test_message_is_acknowledged() {
    let network = MemoryNetwork::new();
    let alice = node(&network, "alice", "Alice");
    let bob = node(&network, "bob", "Bob");
    let mut alice_events = alice.take_event_receiver().unwrap();
    let mut bob_events = bob.take_event_receiver().unwrap();

    bob.start_listening().unwrap();
    wait_for_state(&mut bob_events, ConnectionState::Listening).await;
    while !network.is_listening("bob") {
        tokio::task::yield_now().await;
    }

    alice.connect_to(PeerIdentity::new("bob")).unwrap();
    wait_for_state(&mut alice_events, ConnectionState::Connected).await;
    wait_for_state(&mut bob_events, ConnectionState::Connected).await;
    assert_eq!(
        bob.connected_peer(),
        Some(PeerIdentity::new("alice").with_name("Alice"))
    );

    let mut outgoing = DeliveryTracker::new();
    let id = outgoing.track("hello bob");
    alice.send(frame(b"hello bob")).unwrap();

    // Bob sees the payload and acknowledges it.
    let mut incoming = DeliveryTracker::new();
    let payload = loop {
        let event = next(&mut bob_events).await;
        let mut updates = incoming.on_event(&event);
        if let Some(DeliveryUpdate::Payload { data, peer }) = updates.pop() {
            assert_eq!(peer.label(), "Alice");
            break data;
        }
    };
    assert_eq!(payload, b"hello bob");
    bob.send(ACK_TOKEN).unwrap();

    // Alice sees it written, then delivered.
    let mut statuses = Vec::new();
    while statuses.last() != Some(&DeliveryStatus::Delivered) {
        let event = next(&mut alice_events).await;
        for update in outgoing.on_event(&event) {
            match update {
                DeliveryUpdate::Status(message, status) => {
                    assert_eq!(message, id);
                    statuses.push(status);
                }
                DeliveryUpdate::Payload { .. } => panic!("acknowledgment surfaced as payload"),
            }
        }
    }
    assert_eq!(statuses, vec![DeliveryStatus::Sent, DeliveryStatus::Delivered]);
    assert_eq!(outgoing.pending(), 0);
}

#[tokio::test]
async fn test_back_to_back_messages_are_each_acknowledged() {
    let network = MemoryNetwork::new();
    let alice = node(&network, "alice", "Alice");
    let bob = node(&network, "bob", "Bob");
    let mut alice_events = alice.take_event_receiver().unwrap();
    let mut bob_events = bob.take_event_receiver().unwrap();

    bob.start_listening().unwrap();
    while !network.is_listening("bob") {
        tokio::task::yield_now().await;
    }
    alice.connect_to(PeerIdentity::new("bob")).unwrap();
    wait_for_state(&mut alice_events, ConnectionState::Connected).await;
    wait_for_state(&mut bob_events, ConnectionState::Connected).await;

    let mut outgoing = DeliveryTracker::new();
    let first = outgoing.track("one");
    let second = outgoing.track("two");
    alice.send(frame(b"one")).unwrap();
    alice.send(frame(b"two")).unwrap();

    // However the reads fall, Bob sees two messages and acknowledges each.
    let mut incoming = DeliveryTracker::new();
    let mut payloads = Vec::new();
    while payloads.len() < 2 {
        let event = next(&mut bob_events).await;
        for update in incoming.on_event(&event) {
            if let DeliveryUpdate::Payload { data, .. } = update {
                bob.send(ACK_TOKEN).unwrap();
                payloads.push(data);
            }
        }
    }
    assert_eq!(payloads, vec![b"one".to_vec(), b"two".to_vec()]);

    let mut delivered = Vec::new();
    while delivered.len() < 2 {
        let event = next(&mut alice_events).await;
        for update in outgoing.on_event(&event) {
            if let DeliveryUpdate::Status(id, DeliveryStatus::Delivered) = update {
                delivered.push(id);
            }
        }
    }
    assert_eq!(delivered, vec![first, second]);
    assert_eq!(outgoing.pending(), 0);
}

#[tokio::test]
async fn test_peer_hangup_returns_to_listening() {
    let network = MemoryNetwork::new();
    let alice = node(&network, "alice", "Alice");
    let bob = node(&network, "bob", "Bob");
    let mut alice_events = alice.take_event_receiver().unwrap();
    let mut bob_events = bob.take_event_receiver().unwrap();

    bob.start_listening().unwrap();
    while !network.is_listening("bob") {
        tokio::task::yield_now().await;
    }
    alice.connect_to(PeerIdentity::new("bob")).unwrap();
    wait_for_state(&mut alice_events, ConnectionState::Connected).await;
    wait_for_state(&mut bob_events, ConnectionState::Connected).await;

    alice.shutdown();
    wait_for_state(&mut bob_events, ConnectionState::Idle).await;
    wait_for_state(&mut bob_events, ConnectionState::Listening).await;
    while !network.is_listening("bob") {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_connect_to_nobody_fails() {
    let network = MemoryNetwork::new();
    let alice = node(&network, "alice", "Alice");
    let mut events = alice.take_event_receiver().unwrap();

    alice.connect_to(PeerIdentity::new("nobody")).unwrap();
    assert_eq!(
        next(&mut events).await,
        LinkEvent::StateChanged(ConnectionState::Connecting)
    );
    assert_eq!(
        next(&mut events).await,
        LinkEvent::StateChanged(ConnectionState::Idle)
    );
    assert!(matches!(
        next(&mut events).await,
        LinkEvent::TransientNotice(_)
    ));
    assert_eq!(
        next(&mut events).await,
        LinkEvent::StateChanged(ConnectionState::Listening)
    );
}
