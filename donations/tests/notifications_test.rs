//! Notifications derived from lifecycle events, and their per-user reads.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::harness;
use hemolink_core::{
    BloodGroup, NotificationId, NotificationKind, RequestStatus, RequestStore, Role, UserId,
};

#[tokio::test]
async fn new_request_alerts_compatible_candidates_only() {
    let h = harness();
    let (universal, _) = h.donor(BloodGroup::ONeg).await;
    let (same, _) = h.donor(BloodGroup::APos).await;
    let (incompatible, _) = h.donor(BloodGroup::BPos).await;

    h.open_request(BloodGroup::APos).await;

    let alerted: Vec<UserId> = h
        .store
        .all_notifications()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::RequestUpdate)
        .map(|n| n.user_id)
        .collect();
    assert_eq!(alerted.len(), 2);
    assert!(alerted.contains(&UserId::from(universal)));
    assert!(alerted.contains(&UserId::from(same)));
    assert!(!alerted.contains(&UserId::from(incompatible)));
}

#[tokio::test]
async fn accept_tells_both_sides() {
    let h = harness();
    let (_, donor, _) = h.accepted().await;

    let notifications = h.store.all_notifications();
    let to_hospital = notifications
        .iter()
        .filter(|n| n.user_id == UserId::from(h.hospital_id))
        .count();
    let to_donor = notifications
        .iter()
        .filter(|n| n.user_id == UserId::from(donor) && n.role == Role::Donor)
        .count();
    assert_eq!(to_hospital, 1);
    assert_eq!(to_donor, 1);
}

#[tokio::test]
async fn failed_notifications_do_not_fail_the_transition() {
    let h = harness();
    let request = h.open_request(BloodGroup::APos).await;
    let (donor, ctx) = h.donor(BloodGroup::APos).await;
    h.store.fail_next_notification_inserts(100);

    let accepted = h.app.lifecycle.accept(&ctx, request.id, donor).await.unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);
    assert_eq!(
        h.store.load_request(request.id).await.unwrap().assigned_donor,
        Some(donor)
    );
    assert!(h.store.all_notifications().is_empty());
}

#[tokio::test]
async fn read_flags_and_deletes_are_idempotent() {
    let h = harness();
    let (_, donor, ctx) = h.accepted().await;
    let user = UserId::from(donor);
    let inbox = h.app.notifications();

    assert_eq!(inbox.unread_count(&ctx, user).await.unwrap(), 1);
    let listed = inbox.list_for_user(&ctx, user).await.unwrap();
    let id = listed[0].id;

    inbox.mark_read(&ctx, id).await.unwrap();
    inbox.mark_read(&ctx, id).await.unwrap();
    assert_eq!(inbox.unread_count(&ctx, user).await.unwrap(), 0);

    inbox.mark_read(&ctx, NotificationId::new()).await.unwrap();

    inbox.delete(&ctx, id).await.unwrap();
    inbox.delete(&ctx, id).await.unwrap();
    assert!(inbox.list_for_user(&ctx, user).await.unwrap().is_empty());
}

#[tokio::test]
async fn mark_all_read_flips_only_unread() {
    let h = harness();
    h.open_request(BloodGroup::APos).await;
    let (request, _, _) = h.accepted().await;
    h.app.lifecycle.cancel(&h.hospital, request.id).await.unwrap();

    let inbox = h.app.notifications();
    let hospital = UserId::from(h.hospital_id);
    let unread = inbox.unread_count(&h.hospital, hospital).await.unwrap();
    assert!(unread > 0);

    let flipped = inbox.mark_all_read(&h.hospital, hospital).await.unwrap();
    assert_eq!(usize::try_from(flipped).unwrap(), unread);
    assert_eq!(inbox.mark_all_read(&h.hospital, hospital).await.unwrap(), 0);
}

#[tokio::test]
async fn inboxes_are_private() {
    let h = harness();
    let (_, donor, _) = h.accepted().await;

    let err = h
        .app
        .notifications()
        .list_for_user(&h.hospital, UserId::from(donor))
        .await
        .unwrap_err();
    assert!(matches!(err, hemolink_core::DomainError::Forbidden(_)));
}

#[tokio::test]
async fn foreign_notifications_cannot_be_read_or_deleted() {
    let h = harness();
    let (_, donor, _) = h.accepted().await;
    let inbox = h.app.notifications();
    let owner = UserId::from(donor);
    let note = h
        .store
        .all_notifications()
        .into_iter()
        .find(|n| n.user_id == owner)
        .unwrap();

    let err = inbox.mark_read(&h.hospital, note.id).await.unwrap_err();
    assert!(matches!(err, hemolink_core::DomainError::Forbidden(_)));
    let err = inbox.delete(&h.hospital, note.id).await.unwrap_err();
    assert!(matches!(err, hemolink_core::DomainError::Forbidden(_)));

    let untouched = h
        .store
        .all_notifications()
        .into_iter()
        .find(|n| n.id == note.id)
        .unwrap();
    assert!(!untouched.read);

    inbox.delete(&h.hospital, NotificationId::new()).await.unwrap();
}

#[tokio::test]
async fn accept_whose_acknowledgement_was_lost_still_notifies() {
    let h = harness();
    let request = h.open_request(BloodGroup::APos).await;
    let (donor, ctx) = h.donor(BloodGroup::APos).await;
    let before = h.store.all_notifications().len();
    h.store.lose_next_swap_acks(1);

    let accepted = h.app.lifecycle.accept(&ctx, request.id, donor).await.unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);
    assert_eq!(accepted.assigned_donor, Some(donor));

    let sent = &h.store.all_notifications()[before..];
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().any(|n| n.user_id == UserId::from(h.hospital_id)));
    assert!(sent.iter().any(|n| n.user_id == UserId::from(donor)));
}
