//! Integration tests for the room coordinator, driven through its handle
//! with hand-made outbound queues instead of real connections.

use std::collections::HashSet;

use bytes::Bytes;
use roomhub_room::{Envelope, Member, RoomError, RoomHandle, RoomRegistry, RoomState};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

// =========================================================================
// Helpers
// =========================================================================

async fn new_room() -> (RoomRegistry, RoomHandle) {
    let registry = RoomRegistry::default();
    let room = registry.create_room().await.expect("should create room");
    (registry, room)
}

/// Admits and registers a member with an outbound queue of `capacity`.
async fn seat(
    room: &RoomHandle,
    name: &str,
    capacity: usize,
) -> (Member, mpsc::Receiver<Bytes>) {
    let member = room.admit(name).await.expect("should admit");
    let (tx, rx) = mpsc::channel(capacity);
    room.register(member.clone(), tx)
        .await
        .expect("should register");
    (member, rx)
}

async fn members(room: &RoomHandle) -> HashSet<String> {
    room.info()
        .await
        .expect("room should answer")
        .members
        .into_iter()
        .map(|id| id.to_string())
        .collect()
}

// =========================================================================
// Membership
// =========================================================================

#[tokio::test]
async fn test_register_and_unregister_update_membership() {
    let (_registry, room) = new_room().await;
    let (a, _rx_a) = seat(&room, "a", 8).await;
    let (b, mut rx_b) = seat(&room, "b", 8).await;

    let info = room.info().await.unwrap();
    assert_eq!(info.members.len(), 2);
    assert_eq!(info.admitted, 2);
    assert_eq!(info.state, RoomState::Open);

    room.unregister(b.id()).await.unwrap();
    assert_eq!(members(&room).await, HashSet::from([a.id().to_string()]));

    // Unregistering closes the queue.
    assert_eq!(rx_b.recv().await, None);
}

#[tokio::test]
async fn test_unregister_absent_member_is_noop() {
    let (_registry, room) = new_room().await;
    let (a, mut rx_a) = seat(&room, "a", 8).await;
    let never_seated = room.admit("ghost").await.unwrap();

    room.unregister(never_seated.id()).await.unwrap();
    room.unregister(a.id()).await.unwrap();
    room.unregister(a.id()).await.unwrap();

    assert!(members(&room).await.is_empty());
    assert_eq!(rx_a.recv().await, None);
}

#[tokio::test]
async fn test_concurrent_registrations_are_all_applied() {
    let (_registry, room) = new_room().await;

    let mut tasks = Vec::new();
    for i in 0..50 {
        let room = room.clone();
        tasks.push(tokio::spawn(async move {
            let member = room.admit(format!("m{i}")).await.unwrap();
            let (tx, rx) = mpsc::channel(4);
            room.register(member.clone(), tx).await.unwrap();
            if i % 2 == 0 {
                room.unregister(member.id()).await.unwrap();
            }
            (member, rx)
        }));
    }

    let mut expected = HashSet::new();
    let mut receivers = Vec::new();
    for (i, task) in tasks.into_iter().enumerate() {
        let (member, rx) = task.await.unwrap();
        if i % 2 == 1 {
            expected.insert(member.id().to_string());
        }
        receivers.push(rx);
    }

    assert_eq!(members(&room).await, expected);
}

#[tokio::test]
async fn test_commands_apply_in_submission_order() {
    let (_registry, room) = new_room().await;
    let (a, mut rx_a) = seat(&room, "a", 8).await;
    let member = room.admit("b").await.unwrap();
    let (tx, mut rx_b) = mpsc::channel(8);

    // Register, broadcast, unregister, broadcast: b sees exactly the first.
    room.register(member.clone(), tx).await.unwrap();
    room.broadcast(Envelope::new(a.id(), "one")).await.unwrap();
    room.unregister(member.id()).await.unwrap();
    room.broadcast(Envelope::new(a.id(), "two")).await.unwrap();

    assert_eq!(rx_b.recv().await.as_deref(), Some(&b"one"[..]));
    assert_eq!(rx_b.recv().await, None);
    assert_eq!(rx_a.recv().await.as_deref(), Some(&b"one"[..]));
    assert_eq!(rx_a.recv().await.as_deref(), Some(&b"two"[..]));
}

// =========================================================================
// Broadcast
// =========================================================================

#[tokio::test]
async fn test_broadcast_reaches_every_member_including_sender() {
    let (_registry, room) = new_room().await;
    let (a, mut rx_a) = seat(&room, "a", 8).await;
    let (_b, mut rx_b) = seat(&room, "b", 8).await;

    room.broadcast(Envelope::new(a.id(), "hello")).await.unwrap();

    assert_eq!(rx_a.recv().await.as_deref(), Some(&b"hello"[..]));
    assert_eq!(rx_b.recv().await.as_deref(), Some(&b"hello"[..]));
}

#[tokio::test]
async fn test_broadcast_preserves_bytes() {
    let (_registry, room) = new_room().await;
    let (a, mut rx_a) = seat(&room, "a", 8).await;

    let payload = Bytes::from_static(&[0xff, 0x00, b'\n', 0xfe]);
    room.broadcast(Envelope::new(a.id(), payload.clone()))
        .await
        .unwrap();

    assert_eq!(rx_a.recv().await, Some(payload));
}

#[tokio::test]
async fn test_broadcast_from_unseated_member_is_dropped() {
    let (_registry, room) = new_room().await;
    let (_a, mut rx_a) = seat(&room, "a", 8).await;
    let outsider = room.admit("outsider").await.unwrap();

    room.broadcast(Envelope::new(outsider.id(), "spam"))
        .await
        .unwrap();
    room.info().await.unwrap();

    assert_eq!(rx_a.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_full_queue_evicts_slow_member_only() {
    let (_registry, room) = new_room().await;
    let (a, mut rx_a) = seat(&room, "a", 8).await;
    let (b, mut rx_b) = seat(&room, "b", 1).await;
    let (_c, mut rx_c) = seat(&room, "c", 8).await;

    // Fill b's queue, then drain a and c so only the next payload is left.
    room.broadcast(Envelope::new(a.id(), "P0")).await.unwrap();
    room.broadcast(Envelope::new(a.id(), "P")).await.unwrap();

    assert_eq!(rx_a.recv().await.as_deref(), Some(&b"P0"[..]));
    assert_eq!(rx_a.recv().await.as_deref(), Some(&b"P"[..]));
    assert_eq!(rx_c.recv().await.as_deref(), Some(&b"P0"[..]));
    assert_eq!(rx_c.recv().await.as_deref(), Some(&b"P"[..]));

    // b keeps what it had, then its queue is closed exactly once.
    assert_eq!(rx_b.recv().await.as_deref(), Some(&b"P0"[..]));
    assert_eq!(rx_b.recv().await, None);
    assert_eq!(rx_b.recv().await, None);

    let seated = members(&room).await;
    assert!(!seated.contains(&b.id().to_string()));
    assert_eq!(seated.len(), 2);

    // Unregistering the evicted member later is harmless.
    room.unregister(b.id()).await.unwrap();
    assert_eq!(members(&room).await.len(), 2);
}

#[tokio::test]
async fn test_dropped_receiver_is_evicted_on_next_broadcast() {
    let (_registry, room) = new_room().await;
    let (a, _rx_a) = seat(&room, "a", 8).await;
    let (b, rx_b) = seat(&room, "b", 8).await;
    drop(rx_b);

    room.broadcast(Envelope::new(a.id(), "x")).await.unwrap();

    assert!(!members(&room).await.contains(&b.id().to_string()));
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_started_room_refuses_admission_and_registration() {
    let (_registry, room) = new_room().await;
    let (a, mut rx_a) = seat(&room, "a", 8).await;
    let late = room.admit("late").await.unwrap();

    assert!(room.start());
    assert!(!room.start(), "second start is a no-op");
    assert_eq!(room.state(), RoomState::Started);

    assert!(matches!(
        room.admit("later").await,
        Err(RoomError::NotAdmitted(_))
    ));

    let (tx, mut rx_late) = mpsc::channel(8);
    room.register(late.clone(), tx).await.unwrap();
    assert_eq!(rx_late.recv().await, None, "refused queue is closed");

    // Existing members keep relaying.
    room.broadcast(Envelope::new(a.id(), "still here"))
        .await
        .unwrap();
    assert_eq!(rx_a.recv().await.as_deref(), Some(&b"still here"[..]));
    assert_eq!(members(&room).await, HashSet::from([a.id().to_string()]));
}

#[tokio::test]
async fn test_get_member_finds_admitted_members() {
    let (_registry, room) = new_room().await;
    let admitted = room.admit("ada").await.unwrap();

    let found = room.get_member(admitted.id()).await.unwrap();
    assert_eq!(found.id(), admitted.id());
    assert_eq!(found.name(), "ada");

    let (_other_registry, other_room) = new_room().await;
    assert!(matches!(
        other_room.get_member(admitted.id()).await,
        Err(RoomError::MemberNotFound { .. })
    ));
}
