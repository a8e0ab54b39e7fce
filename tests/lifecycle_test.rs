use std::sync::Arc;

use ad_lifecycle::lifecycle::{CampaignAdmin, ExpirationScheduler, Transition};
use ad_lifecycle::model::{
    AdminPatch, DeactivationReason, ExpirationEvent, ExpirationEvents, NotificationMethod,
    PlacementType, RuntimeInput,
};
use ad_lifecycle::notify::{
    DirectoryUser, InMemoryMessageCenter, NotificationCenterChannel, NotificationDispatcher,
    StaticDirectory,
};
use ad_lifecycle::store::{CampaignStore, FileBackend, MemoryBackend, StorageBackend};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};

struct Harness {
    store: Arc<CampaignStore>,
    admin: CampaignAdmin,
    scheduler: ExpirationScheduler,
    center: Arc<InMemoryMessageCenter>,
}

async fn harness(backend: Arc<dyn StorageBackend>) -> Harness {
    let store = Arc::new(CampaignStore::open(backend, 64).await.unwrap());
    let center = Arc::new(InMemoryMessageCenter::new());
    let directory = StaticDirectory::new(
        ["A", "B", "C"]
            .into_iter()
            .map(|id| DirectoryUser {
                id: id.to_string(),
                name: format!("User {}", id),
                email: None,
            })
            .collect(),
    );
    let dispatcher = Arc::new(
        NotificationDispatcher::new(Arc::new(directory))
            .with_channel(Arc::new(NotificationCenterChannel::new(center.clone()))),
    );
    Harness {
        admin: CampaignAdmin::new(store.clone(), dispatcher.clone()),
        scheduler: ExpirationScheduler::new(store.clone(), dispatcher),
        store,
        center,
    }
}

fn t() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap()
}

fn activation(events: &[ExpirationEvent]) -> AdminPatch {
    let mut selected = ExpirationEvents::new();
    for event in events {
        selected.select(*event);
    }
    AdminPatch {
        active: Some(true),
        runtime: Some(RuntimeInput::Token("5 minutes".to_string())),
        expiration_events: Some(selected),
        notification_methods: Some([NotificationMethod::NotificationCenter].into()),
        notification_users: Some(vec!["A".to_string(), "B".to_string()]),
        ..Default::default()
    }
}

#[tokio::test]
async fn five_minute_campaign_notifies_and_deactivates_once() {
    let h = harness(Arc::new(MemoryBackend::new())).await;

    let applied = h
        .admin
        .apply(
            PlacementType::BrowsePage,
            activation(&[ExpirationEvent::Notify, ExpirationEvent::Deactivate]),
            t(),
        )
        .await
        .unwrap();
    applied.start_notice.unwrap().await.unwrap();
    let (a_before, b_before) = (h.center.count_for("A"), h.center.count_for("B"));
    assert_eq!((a_before, b_before), (1, 1));

    // 窗口结束前什么也不发生
    let early = h.scheduler.tick(t() + TimeDelta::minutes(4)).await;
    assert!(early.transitions.is_empty());

    let expired_at = t() + TimeDelta::minutes(5);
    let mut report = h.scheduler.tick(expired_at).await;
    assert_eq!(
        report.transition(PlacementType::BrowsePage),
        Some(Transition::Deactivated)
    );
    let dispatched = report.join_deliveries().await;
    assert_eq!(dispatched.len(), 1);
    assert!(dispatched[0].failed.is_empty());

    let value = h.store.get(PlacementType::BrowsePage).await;
    assert!(!value.active);
    assert_eq!(value.deactivated_at, Some(expired_at));
    assert_eq!(value.deactivation_reason, Some(DeactivationReason::Expired));

    assert_eq!(h.center.count_for("A"), a_before + 1);
    assert_eq!(h.center.count_for("B"), b_before + 1);
    assert_eq!(h.center.count_for("C"), 0);

    // 之后的 tick 不会再产生任何变化
    let revision = h.store.revision().await;
    for minutes in 6..12 {
        let mut later = h.scheduler.tick(t() + TimeDelta::minutes(minutes)).await;
        assert!(later.transitions.is_empty());
        assert!(later.join_deliveries().await.is_empty());
    }
    assert_eq!(h.store.revision().await, revision);
    assert_eq!(h.center.records().len(), 4);
}

#[tokio::test]
async fn reactivating_an_expired_placement_sends_one_record_per_recipient() {
    let h = harness(Arc::new(MemoryBackend::new())).await;
    h.admin
        .apply(PlacementType::Footer, activation(&[ExpirationEvent::Deactivate]), t())
        .await
        .unwrap()
        .start_notice
        .unwrap()
        .await
        .unwrap();
    h.scheduler.tick(t() + TimeDelta::minutes(5)).await;
    assert!(!h.store.get(PlacementType::Footer).await.active);

    let before = h.center.records().len();
    let again = t() + TimeDelta::minutes(30);
    let applied = h
        .admin
        .apply(
            PlacementType::Footer,
            AdminPatch {
                active: Some(true),
                ..Default::default()
            },
            again,
        )
        .await
        .unwrap();
    assert_eq!(applied.value.start_date, Some(again));
    assert_eq!(
        applied.value.expiration_date,
        Some(again + TimeDelta::minutes(5))
    );
    assert_eq!(applied.value.deactivated_at, None);
    applied.start_notice.unwrap().await.unwrap();

    let records = h.center.records();
    assert_eq!(records.len() - before, 2);
    assert!(records[before..]
        .iter()
        .all(|m| m.body.contains("now running until")));
}

#[tokio::test]
async fn reset_renews_the_window_and_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let backend: Arc<dyn StorageBackend> = Arc::new(FileBackend::new(dir.path()));
    let h = harness(backend.clone()).await;

    let first = h
        .admin
        .apply(
            PlacementType::Messenger,
            activation(&[ExpirationEvent::Notify, ExpirationEvent::Reset]),
            t(),
        )
        .await
        .unwrap();
    first.start_notice.unwrap().await.unwrap();
    let old_expiration = first.value.expiration_date.unwrap();

    let reset_at = old_expiration + TimeDelta::seconds(2);
    let mut report = h.scheduler.tick(reset_at).await;
    report.join_deliveries().await;

    let value = h.store.get(PlacementType::Messenger).await;
    assert!(value.active);
    assert!(!value.handled);
    let new_expiration = value.expiration_date.unwrap();
    assert!(new_expiration > old_expiration);
    assert_eq!(new_expiration, reset_at + TimeDelta::minutes(5));

    // 每个周期只发一次开始通知：激活一次 + 续期一次
    assert_eq!(h.center.count_for("A"), 2);
    let renewal = &h.center.records()[2];
    assert!(renewal.body.contains("now running until"));

    let reopened = CampaignStore::open(backend, 8).await.unwrap();
    assert_eq!(reopened.get(PlacementType::Messenger).await, value);
}
