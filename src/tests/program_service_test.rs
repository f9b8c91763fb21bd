// Catalog read-side tests: ordering, provenance lookup, deadline expiry.

use chrono::{Duration, Utc};

use crate::models::program::{DeadlineType, ProgramStatus};
use crate::services::ProgramService;
use crate::tests::common::{create_test_db, insert_program, test_program};

#[tokio::test]
async fn test_list_active_is_ordered_by_name() {
    let pool = create_test_db().await;
    let service = ProgramService::new(pool.clone());

    let mut c = test_program("c");
    c.name = "Clusterfoerderung".to_string();
    let mut a = test_program("a");
    a.name = "AWS Digitalisierung".to_string();
    let mut b = test_program("b");
    b.name = "Basisprogramm".to_string();
    let mut closed = test_program("x");
    closed.name = "Abgelaufen".to_string();
    closed.status = ProgramStatus::Closed;

    for p in [&c, &a, &b, &closed] {
        insert_program(&pool, p).await;
    }

    let active = service.list_active().await.expect("list");
    let names: Vec<&str> = active.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["AWS Digitalisierung", "Basisprogramm", "Clusterfoerderung"]);
}

#[tokio::test]
async fn test_get_and_get_by_source() {
    let pool = create_test_db().await;
    let service = ProgramService::new(pool.clone());
    insert_program(&pool, &test_program("p1")).await;

    let program = service.get("p1").await.expect("get");
    assert_eq!(program.id, "p1");
    assert!(service.get("fehlt").await.is_err());

    let by_source = service.get_by_source("test", "p1").await.expect("by source");
    assert!(by_source.is_some());
    let missing = service.get_by_source("test", "fehlt").await.expect("by source");
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_expire_overdue_closes_fixed_deadlines_only() {
    let pool = create_test_db().await;
    let service = ProgramService::new(pool.clone());

    let mut overdue = test_program("overdue");
    overdue.deadline = Some(Utc::now() - Duration::days(2));
    overdue.deadline_type = DeadlineType::Fixed;

    let mut upcoming = test_program("upcoming");
    upcoming.deadline = Some(Utc::now() + Duration::days(30));
    upcoming.deadline_type = DeadlineType::Fixed;

    // A past timestamp on a rolling program means nothing.
    let mut rolling = test_program("rolling");
    rolling.deadline = Some(Utc::now() - Duration::days(2));
    rolling.deadline_type = DeadlineType::Rolling;

    for p in [&overdue, &upcoming, &rolling] {
        insert_program(&pool, p).await;
    }

    let expired = service.expire_overdue().await.expect("expire");
    assert_eq!(expired, 1);

    assert_eq!(service.get("overdue").await.expect("get").status, ProgramStatus::Closed);
    assert_eq!(service.get("upcoming").await.expect("get").status, ProgramStatus::Active);
    assert_eq!(service.get("rolling").await.expect("get").status, ProgramStatus::Active);

    // Idempotent: nothing left to expire.
    assert_eq!(service.expire_overdue().await.expect("expire again"), 0);
}

#[tokio::test]
async fn test_program_round_trip_preserves_lists() {
    let pool = create_test_db().await;
    let service = ProgramService::new(pool.clone());

    let mut program = test_program("lists");
    program.target_states = vec!["wien".to_string(), "niederoesterreich".to_string()];
    program.combinable_with = vec!["other".to_string()];
    insert_program(&pool, &program).await;

    let loaded = service.get("lists").await.expect("get");
    assert_eq!(loaded.target_states, program.target_states);
    assert_eq!(loaded.combinable_with, program.combinable_with);
    assert_eq!(loaded.topics, program.topics);
    loaded.check_invariants().expect("invariants");
}
