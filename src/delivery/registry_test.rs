use super::*;
use uuid::Uuid;

fn user() -> UserId {
    UserId::from_uuid(Uuid::new_v4())
}

// =============================================================================
// register
// =============================================================================

#[test]
fn register_creates_entry_and_reports_online() {
    let mut reg = ConnectionRegistry::new();
    let alice = user();
    let c1 = ConnectionId::generate();

    let outcome = reg.register(alice, c1);

    assert!(outcome.came_online);
    assert!(outcome.displaced.is_none());
    assert!(reg.is_online(alice));
    assert_eq!(reg.connections_for(alice), HashSet::from([c1]));
}

#[test]
fn register_second_connection_does_not_report_online() {
    let mut reg = ConnectionRegistry::new();
    let alice = user();
    reg.register(alice, ConnectionId::generate());

    let outcome = reg.register(alice, ConnectionId::generate());

    assert!(!outcome.came_online);
    assert_eq!(reg.connections_for(alice).len(), 2);
}

#[test]
fn register_same_pair_twice_is_idempotent() {
    let mut reg = ConnectionRegistry::new();
    let alice = user();
    let c1 = ConnectionId::generate();

    reg.register(alice, c1);
    let again = reg.register(alice, c1);

    assert!(!again.came_online);
    assert_eq!(reg.connections_for(alice).len(), 1);
    assert_eq!(reg.connection_count(), 1);
}

#[test]
fn register_moves_connection_owned_by_another_user() {
    let mut reg = ConnectionRegistry::new();
    let alice = user();
    let bob = user();
    let c1 = ConnectionId::generate();
    reg.register(alice, c1);

    let outcome = reg.register(bob, c1);

    assert!(outcome.came_online);
    assert_eq!(outcome.displaced, Some(Unregistered { user_id: alice, went_offline: true }));
    assert!(!reg.is_online(alice));
    assert_eq!(reg.owner_of(c1), Some(bob));
    assert_eq!(reg.connection_count(), 1);
}

// =============================================================================
// unregister
// =============================================================================

#[test]
fn unregister_unknown_is_noop() {
    let mut reg = ConnectionRegistry::new();
    assert!(reg.unregister(ConnectionId::generate()).is_none());
}

#[test]
fn unregister_twice_reports_once() {
    let mut reg = ConnectionRegistry::new();
    let alice = user();
    let c1 = ConnectionId::generate();
    reg.register(alice, c1);

    assert_eq!(reg.unregister(c1), Some(Unregistered { user_id: alice, went_offline: true }));
    assert!(reg.unregister(c1).is_none());
}

#[test]
fn unregister_last_connection_removes_entry() {
    let mut reg = ConnectionRegistry::new();
    let alice = user();
    let c1 = ConnectionId::generate();
    let c2 = ConnectionId::generate();
    reg.register(alice, c1);
    reg.register(alice, c2);

    let first = reg.unregister(c1).expect("known connection");
    assert!(!first.went_offline);
    assert!(reg.is_online(alice));

    let second = reg.unregister(c2).expect("known connection");
    assert!(second.went_offline);
    assert!(!reg.is_online(alice));
    assert!(reg.connections_for(alice).is_empty());
    assert!(reg.online_users().is_empty());
}

// =============================================================================
// set semantics
// =============================================================================

#[test]
fn connections_for_unknown_user_is_empty() {
    let reg = ConnectionRegistry::new();
    assert!(reg.connections_for(user()).is_empty());
}

#[test]
fn connections_for_matches_registered_minus_unregistered() {
    let mut reg = ConnectionRegistry::new();
    let alice = user();
    let bob = user();
    let conns: Vec<ConnectionId> = (0..6).map(|_| ConnectionId::generate()).collect();

    for (i, c) in conns.iter().enumerate() {
        let owner = if i % 2 == 0 { alice } else { bob };
        reg.register(owner, *c);
    }
    // Mixed order, including an unknown id and a repeat.
    reg.unregister(conns[4]);
    reg.unregister(ConnectionId::generate());
    reg.unregister(conns[1]);
    reg.unregister(conns[4]);

    assert_eq!(reg.connections_for(alice), HashSet::from([conns[0], conns[2]]));
    assert_eq!(reg.connections_for(bob), HashSet::from([conns[3], conns[5]]));
    assert_eq!(reg.connection_count(), 4);
}

#[test]
fn online_users_lists_each_user_once() {
    let mut reg = ConnectionRegistry::new();
    let alice = user();
    let bob = user();
    reg.register(alice, ConnectionId::generate());
    reg.register(alice, ConnectionId::generate());
    reg.register(bob, ConnectionId::generate());

    let mut online = reg.online_users();
    online.sort();
    let mut expected = vec![alice, bob];
    expected.sort();
    assert_eq!(online, expected);
}
