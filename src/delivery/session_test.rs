use super::*;
use uuid::Uuid;

fn setup() -> (Arc<PresenceTracker>, UserId) {
    (Arc::new(PresenceTracker::default()), UserId::from_uuid(Uuid::new_v4()))
}

#[test]
fn new_session_is_connecting_and_unregistered() {
    let (presence, alice) = setup();
    let session = DeliverySession::new(alice, presence.clone());

    assert_eq!(session.state(), SessionState::Connecting);
    assert_eq!(session.user_id(), alice);
    assert!(!presence.is_online(alice));
}

#[test]
fn sessions_get_distinct_connection_ids() {
    let (presence, alice) = setup();
    let a = DeliverySession::new(alice, presence.clone());
    let b = DeliverySession::new(alice, presence);
    assert_ne!(a.connection_id(), b.connection_id());
}

#[test]
fn activate_registers_connection() {
    let (presence, alice) = setup();
    let mut session = DeliverySession::new(alice, presence.clone());

    session.activate().expect("connecting session activates");

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(presence.connections_for(alice), vec![session.connection_id()]);
}

#[test]
fn activate_twice_is_rejected() {
    let (presence, alice) = setup();
    let mut session = DeliverySession::new(alice, presence.clone());
    session.activate().unwrap();

    let err = session.activate().unwrap_err();

    assert_eq!(err, SessionError::AlreadyActive(session.connection_id()));
    assert_eq!(presence.connection_count(), 1);
}

#[test]
fn close_unregisters_and_is_terminal() {
    let (presence, alice) = setup();
    let mut session = DeliverySession::new(alice, presence.clone());
    session.activate().unwrap();

    session.close(CloseReason::ClientClosed);

    assert_eq!(session.state(), SessionState::Closed);
    assert!(!presence.is_online(alice));
    assert_eq!(session.activate().unwrap_err(), SessionError::Closed(session.connection_id()));
    assert!(!presence.is_online(alice), "closed session must not re-register");
}

#[test]
fn close_twice_emits_one_offline_event() {
    let (presence, alice) = setup();
    let mut session = DeliverySession::new(alice, presence.clone());
    session.activate().unwrap();
    let mut rx = presence.subscribe();

    session.close(CloseReason::TransportError);
    session.close(CloseReason::ClientClosed);

    assert!(!rx.try_recv().expect("offline event").online);
    assert!(rx.try_recv().is_err());
}

#[test]
fn close_before_activate_does_not_touch_registry() {
    let (presence, alice) = setup();
    let mut other = DeliverySession::new(alice, presence.clone());
    other.activate().unwrap();

    let mut pending = DeliverySession::new(alice, presence.clone());
    pending.close(CloseReason::ClientClosed);

    assert_eq!(pending.state(), SessionState::Closed);
    assert_eq!(presence.connections_for(alice), vec![other.connection_id()]);
}

#[test]
fn drop_closes_active_session() {
    let (presence, alice) = setup();
    {
        let mut session = DeliverySession::new(alice, presence.clone());
        session.activate().unwrap();
        assert!(presence.is_online(alice));
    }
    assert!(!presence.is_online(alice));
}

#[test]
fn connection_closed_by_router_then_session_close_is_noop() {
    let (presence, alice) = setup();
    let mut session = DeliverySession::new(alice, presence.clone());
    session.activate().unwrap();

    // Self-healing unregister from a failed delivery.
    assert!(presence.on_disconnect(session.connection_id()));
    session.close(CloseReason::QueueClosed);

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(presence.connection_count(), 0);
}
