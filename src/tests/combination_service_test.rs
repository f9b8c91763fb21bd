// Combination analyzer tests against the catalog store.

use std::sync::Arc;

use crate::services::{CombinationService, CombinationVerdict, ProgramService};
use crate::tests::common::{create_test_db, insert_program, test_program};

#[tokio::test]
async fn test_analyze_enumerates_all_three_groups() {
    let pool = create_test_db().await;
    let program_service = Arc::new(ProgramService::new(pool.clone()));
    let service = CombinationService::new(Arc::clone(&program_service));

    // Primary: federal, explicitly combinable with "partner" (also FFG),
    // explicitly excluded from "verboten", and a state program in the
    // catalog for the inference rule.
    let mut primary = test_program("primary");
    primary.provider = "FFG".to_string();
    primary.max_amount = Some(100_000);
    primary.combinable_with = vec!["partner".to_string()];
    primary.not_combinable_with = vec!["verboten".to_string()];

    let mut partner = test_program("partner");
    partner.provider = "FFG".to_string();
    partner.max_amount = Some(50_000);

    let mut verboten = test_program("verboten");
    verboten.provider = "AWS".to_string();

    let mut land = test_program("land");
    land.provider = "SFG".to_string();

    for p in [&primary, &partner, &verboten, &land] {
        insert_program(&pool, p).await;
    }

    let analysis = service.analyze("primary").await.expect("analyze");

    assert_eq!(analysis.explicit.len(), 1);
    assert_eq!(analysis.explicit[0].program_id, "partner");
    assert!(analysis.explicit[0].same_provider);
    assert_eq!(analysis.combined_max_amount, 150_000);

    assert_eq!(analysis.excluded.len(), 1);
    assert_eq!(analysis.excluded[0].program_id, "verboten");

    // Only the state program is inferred; the excluded federal partner
    // and the explicit partner are filtered out.
    assert_eq!(analysis.inferred.len(), 1);
    assert_eq!(analysis.inferred[0].program_id, "land");
    assert!(!analysis.inferred[0].warning.is_empty());
}

#[tokio::test]
async fn test_validate_pair_verdicts() {
    let pool = create_test_db().await;
    let program_service = Arc::new(ProgramService::new(pool.clone()));
    let service = CombinationService::new(Arc::clone(&program_service));

    let mut bund = test_program("bund");
    bund.provider = "FFG".to_string();
    bund.not_combinable_with = vec!["konkurrenz".to_string()];
    let mut konkurrenz = test_program("konkurrenz");
    konkurrenz.provider = "AWS".to_string();
    let mut land = test_program("land");
    land.provider = "Wirtschaftsagentur Wien".to_string();
    let mut bank = test_program("bank");
    bank.provider = "Hausbank".to_string();

    for p in [&bund, &konkurrenz, &land, &bank] {
        insert_program(&pool, p).await;
    }

    let no = service.validate_pair("bund", "konkurrenz").await.expect("validate");
    assert_eq!(no.verdict, CombinationVerdict::ExplicitNo);
    assert_eq!(no.is_valid, Some(false));

    let inferred = service.validate_pair("bund", "land").await.expect("validate");
    assert_eq!(inferred.verdict, CombinationVerdict::InferredYes);
    assert_eq!(inferred.is_valid, Some(true));

    let unknown = service.validate_pair("bund", "bank").await.expect("validate");
    assert_eq!(unknown.verdict, CombinationVerdict::Unknown);
    assert_eq!(unknown.is_valid, None);

    // Symmetry on the stored pair.
    let reversed = service.validate_pair("konkurrenz", "bund").await.expect("validate");
    assert_eq!(reversed.is_valid, Some(false));

    assert!(service.validate_pair("bund", "fehlt").await.is_err());
}
