use super::*;
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;
use uuid::Uuid;

fn user() -> UserId {
    UserId::from_uuid(Uuid::new_v4())
}

fn drain(rx: &mut broadcast::Receiver<PresenceEvent>) -> Vec<PresenceEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return events,
            Err(TryRecvError::Lagged(_)) => {}
        }
    }
}

#[test]
fn is_online_follows_connections() {
    let presence = PresenceTracker::default();
    let alice = user();
    let c1 = ConnectionId::generate();

    assert!(!presence.is_online(alice));
    presence.on_connect(alice, c1);
    assert!(presence.is_online(alice));
    presence.on_disconnect(c1);
    assert!(!presence.is_online(alice));
}

#[test]
fn first_connection_emits_online_once() {
    let presence = PresenceTracker::default();
    let mut rx = presence.subscribe();
    let alice = user();

    presence.on_connect(alice, ConnectionId::generate());
    presence.on_connect(alice, ConnectionId::generate());

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user_id, alice);
    assert!(events[0].online);
}

#[test]
fn last_disconnect_emits_offline_exactly_once() {
    let presence = PresenceTracker::default();
    let alice = user();
    let c1 = ConnectionId::generate();
    let c2 = ConnectionId::generate();
    presence.on_connect(alice, c1);
    presence.on_connect(alice, c2);
    let mut rx = presence.subscribe();

    assert!(presence.on_disconnect(c1));
    assert!(drain(&mut rx).is_empty(), "still online on c2");

    assert!(presence.on_disconnect(c2));
    assert!(!presence.on_disconnect(c2), "late duplicate is ignored");

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user_id, alice);
    assert!(!events[0].online);
    assert!(!presence.is_online(alice));
}

#[test]
fn disconnect_unknown_connection_emits_nothing() {
    let presence = PresenceTracker::default();
    let mut rx = presence.subscribe();

    assert!(!presence.on_disconnect(ConnectionId::generate()));
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn emit_without_subscribers_does_not_fail() {
    let presence = PresenceTracker::new(1);
    let alice = user();
    let c1 = ConnectionId::generate();

    presence.on_connect(alice, c1);
    presence.on_disconnect(c1);
    assert_eq!(presence.connection_count(), 0);
}

#[test]
fn zero_capacity_is_clamped() {
    let presence = PresenceTracker::new(0);
    let mut rx = presence.subscribe();
    presence.on_connect(user(), ConnectionId::generate());
    assert_eq!(drain(&mut rx).len(), 1);
}

#[test]
fn connections_for_returns_snapshot() {
    let presence = PresenceTracker::default();
    let bob = user();
    let c2 = ConnectionId::generate();
    let c3 = ConnectionId::generate();
    presence.on_connect(bob, c2);
    presence.on_connect(bob, c3);

    let mut conns = presence.connections_for(bob);
    conns.sort();
    let mut expected = vec![c2, c3];
    expected.sort();
    assert_eq!(conns, expected);
    assert_eq!(presence.online_users(), vec![bob]);
}

#[test]
fn concurrent_connect_disconnect_leaves_consistent_state() {
    let presence = Arc::new(PresenceTracker::default());
    let alice = user();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let presence = Arc::clone(&presence);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let conn = ConnectionId::generate();
                    presence.on_connect(alice, conn);
                    presence.on_disconnect(conn);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    assert!(!presence.is_online(alice));
    assert_eq!(presence.connection_count(), 0);
}

#[test]
fn transitions_alternate_for_one_user() {
    let presence = PresenceTracker::default();
    let mut rx = presence.subscribe();
    let alice = user();

    for _ in 0..3 {
        let conn = ConnectionId::generate();
        presence.on_connect(alice, conn);
        presence.on_disconnect(conn);
    }

    let flags: Vec<bool> = drain(&mut rx).iter().map(|e| e.online).collect();
    assert_eq!(flags, vec![true, false, true, false, true, false]);
}
