// Monitor loop tests: thresholds, deduplication, digest stamping.

use std::sync::Arc;

use crate::models::monitor::{CreateMonitorRequest, DigestCadence, UpdateMonitorRequest};
use crate::tests::common::{
    ScriptedAnalyst, build_harness, create_test_profile, insert_program, test_program,
};

fn monitor_request(profile_id: &str, threshold: i64, cadence: &str) -> CreateMonitorRequest {
    CreateMonitorRequest {
        profile_id: profile_id.to_string(),
        min_score_threshold: threshold,
        notify_email: true,
        notify_portal: true,
        digest_cadence: cadence.to_string(),
    }
}

#[tokio::test]
async fn test_monitor_creates_notification_above_threshold() {
    let analyst = Arc::new(ScriptedAnalyst::always_eligible());
    let harness = build_harness(Some(analyst)).await;
    insert_program(&harness.pool, &test_program("p1")).await;

    let profile = create_test_profile(&harness.profile_service, 1).await;
    let monitor = harness
        .monitor_service
        .create(1, monitor_request(&profile.id, 70, "immediate"))
        .await
        .expect("create monitor");

    let inserted = harness
        .monitor_service
        .check_monitor(&monitor, &harness.search_service)
        .await
        .expect("check");
    assert_eq!(inserted, 1);

    let notifications = harness.monitor_service.list_notifications(1).await.expect("list");
    assert_eq!(notifications.len(), 1);
    // Fixture pair: rules 1.0, analyst 0.9 -> 0.4 + 0.54 = 94%.
    assert_eq!(notifications[0].score, 94);
    assert!(!notifications[0].match_summary.is_empty());
    // Immediate cadence stamps delivery on insert.
    assert!(notifications[0].email_sent);
    assert!(notifications[0].email_sent_at.is_some());
    assert!(notifications[0].portal_notified);

    let refreshed = harness.monitor_service.get(1, &monitor.id).await.expect("get");
    assert_eq!(refreshed.matches_found, 1);
    assert!(refreshed.last_check_at.is_some());
    assert!(refreshed.last_notification_at.is_some());
}

#[tokio::test]
async fn test_monitor_below_threshold_stays_silent() {
    // Rule-only run scores 0.4 -> 40%, below the 70% threshold.
    let harness = build_harness(None).await;
    insert_program(&harness.pool, &test_program("p1")).await;

    let profile = create_test_profile(&harness.profile_service, 1).await;
    let monitor = harness
        .monitor_service
        .create(1, monitor_request(&profile.id, 70, "immediate"))
        .await
        .expect("create monitor");

    let inserted = harness
        .monitor_service
        .check_monitor(&monitor, &harness.search_service)
        .await
        .expect("check");
    assert_eq!(inserted, 0);
    assert!(harness.monitor_service.list_notifications(1).await.expect("list").is_empty());
}

#[tokio::test]
async fn test_duplicate_notifications_suppressed() {
    // Day 1 notifies; day 2 with the prior notification unviewed must not
    // notify again, and matches_found stays unchanged.
    let analyst = Arc::new(ScriptedAnalyst::always_eligible());
    let harness = build_harness(Some(analyst)).await;
    insert_program(&harness.pool, &test_program("p1")).await;

    let profile = create_test_profile(&harness.profile_service, 1).await;
    let monitor = harness
        .monitor_service
        .create(1, monitor_request(&profile.id, 70, "immediate"))
        .await
        .expect("create monitor");

    let day1 = harness
        .monitor_service
        .check_monitor(&monitor, &harness.search_service)
        .await
        .expect("day 1");
    assert_eq!(day1, 1);

    let day2 = harness
        .monitor_service
        .check_monitor(&monitor, &harness.search_service)
        .await
        .expect("day 2");
    assert_eq!(day2, 0);

    let notifications = harness.monitor_service.list_notifications(1).await.expect("list");
    assert_eq!(notifications.len(), 1);
    let refreshed = harness.monitor_service.get(1, &monitor.id).await.expect("get");
    assert_eq!(refreshed.matches_found, 1);
}

#[tokio::test]
async fn test_viewed_notification_allows_renotification() {
    let analyst = Arc::new(ScriptedAnalyst::always_eligible());
    let harness = build_harness(Some(analyst)).await;
    insert_program(&harness.pool, &test_program("p1")).await;

    let profile = create_test_profile(&harness.profile_service, 1).await;
    let monitor = harness
        .monitor_service
        .create(1, monitor_request(&profile.id, 70, "immediate"))
        .await
        .expect("create monitor");

    harness
        .monitor_service
        .check_monitor(&monitor, &harness.search_service)
        .await
        .expect("first check");
    let notifications = harness.monitor_service.list_notifications(1).await.expect("list");
    harness
        .monitor_service
        .mark_viewed(1, &notifications[0].id)
        .await
        .expect("mark viewed");

    let again = harness
        .monitor_service
        .check_monitor(&monitor, &harness.search_service)
        .await
        .expect("second check");
    assert_eq!(again, 1);
    assert_eq!(harness.monitor_service.list_notifications(1).await.expect("list").len(), 2);
}

#[tokio::test]
async fn test_sweep_is_isolated_per_monitor() {
    let analyst = Arc::new(ScriptedAnalyst::always_eligible());
    let harness = build_harness(Some(analyst)).await;
    insert_program(&harness.pool, &test_program("p1")).await;

    let profile = create_test_profile(&harness.profile_service, 1).await;
    harness
        .monitor_service
        .create(1, monitor_request(&profile.id, 70, "immediate"))
        .await
        .expect("healthy monitor");

    // A monitor whose profile has vanished is skipped fail-soft.
    let orphan_profile = create_test_profile(&harness.profile_service, 1).await;
    harness
        .monitor_service
        .create(1, monitor_request(&orphan_profile.id, 70, "immediate"))
        .await
        .expect("orphan monitor");
    harness
        .profile_service
        .delete(1, &orphan_profile.id)
        .await
        .expect("delete profile");

    let report = harness
        .monitor_service
        .check_all(&harness.search_service)
        .await
        .expect("sweep");
    assert_eq!(report.checked, 2);
    assert_eq!(report.notifications_created, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn test_daily_digest_defers_email_stamping() {
    let analyst = Arc::new(ScriptedAnalyst::always_eligible());
    let harness = build_harness(Some(analyst)).await;
    insert_program(&harness.pool, &test_program("p1")).await;

    let profile = create_test_profile(&harness.profile_service, 1).await;
    let monitor = harness
        .monitor_service
        .create(1, monitor_request(&profile.id, 70, "daily"))
        .await
        .expect("create monitor");

    harness
        .monitor_service
        .check_monitor(&monitor, &harness.search_service)
        .await
        .expect("check");

    let notifications = harness.monitor_service.list_notifications(1).await.expect("list");
    assert_eq!(notifications.len(), 1);
    assert!(!notifications[0].email_sent, "digest cadence defers delivery");

    let unsent = harness
        .monitor_service
        .list_unsent_email(DigestCadence::Daily)
        .await
        .expect("unsent");
    assert_eq!(unsent.len(), 1);

    // Exactly-once stamping: the second attempt is a no-op.
    assert!(harness.monitor_service.mark_email_sent(&unsent[0].id).await.expect("stamp"));
    assert!(!harness.monitor_service.mark_email_sent(&unsent[0].id).await.expect("restamp"));
    assert!(
        harness
            .monitor_service
            .list_unsent_email(DigestCadence::Daily)
            .await
            .expect("unsent after stamp")
            .is_empty()
    );
}

#[tokio::test]
async fn test_invalid_cadence_rejected() {
    let harness = build_harness(None).await;
    let profile = create_test_profile(&harness.profile_service, 1).await;

    let result = harness
        .monitor_service
        .create(1, monitor_request(&profile.id, 70, "hourly"))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_monitor_update_and_tenant_scope() {
    let harness = build_harness(None).await;
    let profile = create_test_profile(&harness.profile_service, 1).await;
    let monitor = harness
        .monitor_service
        .create(1, monitor_request(&profile.id, 70, "immediate"))
        .await
        .expect("create");

    let updated = harness
        .monitor_service
        .update(
            1,
            &monitor.id,
            UpdateMonitorRequest {
                active: Some(false),
                min_score_threshold: Some(85),
                notify_email: None,
                notify_portal: None,
                digest_cadence: Some("weekly".to_string()),
            },
        )
        .await
        .expect("update");
    assert!(!updated.active);
    assert_eq!(updated.min_score_threshold, 85);
    assert_eq!(updated.digest_cadence, "weekly");

    // Other tenants see nothing.
    assert!(harness.monitor_service.get(2, &monitor.id).await.is_err());
    assert!(harness.monitor_service.list(2).await.expect("list").is_empty());
}
