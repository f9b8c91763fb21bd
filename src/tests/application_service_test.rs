// Application lifecycle tests: state graph, timeline, attachments, stats.

use crate::models::application::{
    AddAttachmentRequest, ApplicationStatus, CreateApplicationRequest, TransitionRequest,
    UpdateApplicationRequest,
};
use crate::services::ApplicationService;
use crate::tests::common::{
    build_harness, create_test_profile, insert_program, test_program,
};

fn transition(status: &str) -> TransitionRequest {
    TransitionRequest {
        status: status.to_string(),
        description: None,
        author: Some("sachbearbeiter".to_string()),
    }
}

async fn setup() -> (crate::tests::common::TestHarness, ApplicationService, String) {
    let harness = build_harness(None).await;
    insert_program(&harness.pool, &test_program("prog")).await;
    let profile = create_test_profile(&harness.profile_service, 1).await;
    let service = ApplicationService::new(harness.pool.clone());
    (harness, service, profile.id)
}

#[tokio::test]
async fn test_create_starts_planned_with_timeline() {
    let (_harness, service, profile_id) = setup().await;

    let application = service
        .create(
            1,
            CreateApplicationRequest {
                profile_id,
                program_id: "prog".to_string(),
                requested_amount: Some(50_000),
                internal_reference: Some("AZ-2026-001".to_string()),
                notes: None,
            },
            Some("maria"),
        )
        .await
        .expect("create");

    assert_eq!(application.status, "planned");
    let timeline = application.timeline().expect("timeline");
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].status, "planned");
    assert_eq!(timeline[0].author.as_deref(), Some("maria"));
}

#[tokio::test]
async fn test_full_lifecycle_appends_timeline_entries() {
    let (_harness, service, profile_id) = setup().await;
    let application = service
        .create(
            1,
            CreateApplicationRequest {
                profile_id,
                program_id: "prog".to_string(),
                requested_amount: Some(50_000),
                internal_reference: None,
                notes: None,
            },
            None,
        )
        .await
        .expect("create");

    let mut current = application;
    for (i, status) in ["drafting", "submitted", "in_review", "approved"].iter().enumerate() {
        current = service.transition(1, &current.id, transition(status)).await.expect(status);
        assert_eq!(current.status, *status);
        // Exactly one timeline entry per accepted transition.
        assert_eq!(current.timeline().expect("timeline").len(), i + 2);
    }

    assert!(current.submitted_at.is_some());
    assert!(current.decision_date.is_some());
    assert_eq!(current.status_enum().expect("status"), ApplicationStatus::Approved);
}

#[tokio::test]
async fn test_illegal_transition_is_rejected_without_timeline_entry() {
    // Scenario: approved application, attempt to move back to drafting.
    let (_harness, service, profile_id) = setup().await;
    let application = service
        .create(
            1,
            CreateApplicationRequest {
                profile_id,
                program_id: "prog".to_string(),
                requested_amount: None,
                internal_reference: None,
                notes: None,
            },
            None,
        )
        .await
        .expect("create");

    let mut current = application;
    for status in ["drafting", "submitted", "in_review", "approved"] {
        current = service.transition(1, &current.id, transition(status)).await.expect(status);
    }
    let timeline_before = current.timeline().expect("timeline").len();

    let err = service
        .transition(1, &current.id, transition("drafting"))
        .await
        .expect_err("approved -> drafting must fail");
    assert!(matches!(err, crate::utils::ApiError::PreconditionFailed(_)));

    let unchanged = service.get(1, &current.id).await.expect("get");
    assert_eq!(unchanged.status, "approved");
    assert_eq!(unchanged.timeline().expect("timeline").len(), timeline_before);
}

#[tokio::test]
async fn test_withdrawal_only_from_non_terminal_states() {
    let (_harness, service, profile_id) = setup().await;
    let application = service
        .create(
            1,
            CreateApplicationRequest {
                profile_id,
                program_id: "prog".to_string(),
                requested_amount: None,
                internal_reference: None,
                notes: None,
            },
            None,
        )
        .await
        .expect("create");

    let withdrawn = service
        .transition(1, &application.id, transition("withdrawn"))
        .await
        .expect("withdraw from planned");
    assert_eq!(withdrawn.status, "withdrawn");

    // Terminal: no way back, no second withdrawal.
    assert!(service.transition(1, &withdrawn.id, transition("drafting")).await.is_err());
    assert!(service.transition(1, &withdrawn.id, transition("withdrawn")).await.is_err());
}

#[tokio::test]
async fn test_skipping_states_is_rejected() {
    let (_harness, service, profile_id) = setup().await;
    let application = service
        .create(
            1,
            CreateApplicationRequest {
                profile_id,
                program_id: "prog".to_string(),
                requested_amount: None,
                internal_reference: None,
                notes: None,
            },
            None,
        )
        .await
        .expect("create");

    assert!(service.transition(1, &application.id, transition("submitted")).await.is_err());
    assert!(service.transition(1, &application.id, transition("approved")).await.is_err());
}

#[tokio::test]
async fn test_approved_amount_bounded_by_program_and_request() {
    let (_harness, service, profile_id) = setup().await;
    // Fixture program caps at 150_000.
    let application = service
        .create(
            1,
            CreateApplicationRequest {
                profile_id,
                program_id: "prog".to_string(),
                requested_amount: Some(50_000),
                internal_reference: None,
                notes: None,
            },
            None,
        )
        .await
        .expect("create");

    let err = service
        .update(
            1,
            &application.id,
            UpdateApplicationRequest {
                requested_amount: None,
                approved_amount: Some(200_000),
                internal_reference: None,
                decision_notes: None,
                notes: None,
            },
        )
        .await
        .expect_err("over the cap");
    assert!(err.to_string().contains("exceeds"));

    let updated = service
        .update(
            1,
            &application.id,
            UpdateApplicationRequest {
                requested_amount: None,
                approved_amount: Some(120_000),
                internal_reference: None,
                decision_notes: Some("Teilgenehmigung".to_string()),
                notes: None,
            },
        )
        .await
        .expect("within cap");
    assert_eq!(updated.approved_amount, Some(120_000));
}

#[tokio::test]
async fn test_attachments_unique_per_application() {
    let (_harness, service, profile_id) = setup().await;
    let application = service
        .create(
            1,
            CreateApplicationRequest {
                profile_id,
                program_id: "prog".to_string(),
                requested_amount: None,
                internal_reference: None,
                notes: None,
            },
            None,
        )
        .await
        .expect("create");

    let with_attachment = service
        .add_attachment(
            1,
            &application.id,
            AddAttachmentRequest {
                filename: "businessplan.pdf".to_string(),
                size_bytes: Some(120_000),
                content_type: Some("application/pdf".to_string()),
            },
        )
        .await
        .expect("add");
    assert_eq!(with_attachment.attachments().expect("attachments").len(), 1);

    let err = service
        .add_attachment(
            1,
            &application.id,
            AddAttachmentRequest {
                filename: "businessplan.pdf".to_string(),
                size_bytes: None,
                content_type: None,
            },
        )
        .await
        .expect_err("duplicate filename");
    assert!(err.to_string().contains("already exists"));

    let removed = service
        .remove_attachment(1, &application.id, "businessplan.pdf")
        .await
        .expect("remove");
    assert!(removed.attachments().expect("attachments").is_empty());

    assert!(service.remove_attachment(1, &application.id, "fehlt.pdf").await.is_err());
}

#[tokio::test]
async fn test_stats_aggregate_per_status_and_amounts() {
    let (_harness, service, profile_id) = setup().await;

    for (requested, advance) in [(Some(10_000), false), (Some(20_000), true)] {
        let application = service
            .create(
                1,
                CreateApplicationRequest {
                    profile_id: profile_id.clone(),
                    program_id: "prog".to_string(),
                    requested_amount: requested,
                    internal_reference: None,
                    notes: None,
                },
                None,
            )
            .await
            .expect("create");
        if advance {
            let mut current = application;
            for status in ["drafting", "submitted", "in_review", "approved"] {
                current = service.transition(1, &current.id, transition(status)).await.expect(status);
            }
            service
                .update(
                    1,
                    &current.id,
                    UpdateApplicationRequest {
                        requested_amount: None,
                        approved_amount: Some(15_000),
                        internal_reference: None,
                        decision_notes: None,
                        notes: None,
                    },
                )
                .await
                .expect("approve amount");
        }
    }

    let stats = service.stats(1).await.expect("stats");
    assert_eq!(stats.total_requested, 30_000);
    assert_eq!(stats.total_approved, 15_000);
    let planned = stats.by_status.iter().find(|s| s.status == "planned").expect("planned");
    assert_eq!(planned.count, 1);
    let approved = stats.by_status.iter().find(|s| s.status == "approved").expect("approved");
    assert_eq!(approved.count, 1);

    // Stats are tenant-scoped.
    let empty = service.stats(2).await.expect("stats tenant 2");
    assert_eq!(empty.total_requested, 0);
    assert!(empty.by_status.is_empty());
}

#[tokio::test]
async fn test_tenant_isolation() {
    let (_harness, service, profile_id) = setup().await;
    let application = service
        .create(
            1,
            CreateApplicationRequest {
                profile_id,
                program_id: "prog".to_string(),
                requested_amount: None,
                internal_reference: None,
                notes: None,
            },
            None,
        )
        .await
        .expect("create");

    assert!(service.get(2, &application.id).await.is_err());
    assert!(service.transition(2, &application.id, transition("drafting")).await.is_err());
    assert!(service.delete(2, &application.id).await.is_err());
    service.delete(1, &application.id).await.expect("delete own");
}
