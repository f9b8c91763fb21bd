//! Shared fixtures for service tests.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{LlmConfig, SearchConfig};
use crate::models::profile::{CompanyProfile, CreateProfileRequest};
use crate::models::program::{DeadlineType, FundingType, Program, ProgramStatus, TargetGroup};
use crate::services::llm::{AnalyzedVerdict, Confidence, LLMAnalyst, LLMError, LLMVerdict, TokenUsage};
use crate::services::{
    MonitorService, ProfileService, ProgramService, ResultCaches, SearchService,
};

pub async fn create_test_db() -> SqlitePool {
    crate::db::init_test_db().await
}

/// A catalog program with sane defaults, matching the fixture profile.
pub fn test_program(id: &str) -> Program {
    Program {
        id: id.to_string(),
        name: format!("Programm {}", id),
        provider: "FFG".to_string(),
        funding_type: FundingType::Grant,
        funding_rate_min: 0.2,
        funding_rate_max: 0.5,
        min_amount: Some(5_000),
        max_amount: Some(150_000),
        target_sizes: vec![],
        target_group: TargetGroup::All,
        min_company_age: None,
        max_company_age: None,
        legal_forms: vec![],
        industries: vec![],
        excluded_industries: vec![],
        target_states: vec![],
        topics: vec!["digitalisierung".to_string(), "innovation".to_string()],
        requirements: "F&E- und Digitalisierungsprojekte".to_string(),
        deadline: None,
        deadline_type: DeadlineType::Rolling,
        call_start: None,
        call_end: None,
        url: "https://example.at".to_string(),
        guidelines_url: None,
        combinable_with: vec![],
        not_combinable_with: vec![],
        status: ProgramStatus::Active,
        is_highlight: false,
        source: "test".to_string(),
        source_id: id.to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub async fn insert_program(pool: &SqlitePool, program: &Program) {
    sqlx::query(
        r#"INSERT INTO programs
           (id, name, provider, funding_type, funding_rate_min, funding_rate_max,
            min_amount, max_amount, target_sizes_json, target_group,
            min_company_age, max_company_age, legal_forms_json, industries_json,
            excluded_industries_json, target_states_json, topics_json,
            requirements, deadline, deadline_type, call_start, call_end, url,
            guidelines_url, combinable_with_json, not_combinable_with_json,
            status, is_highlight, source, source_id, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&program.id)
    .bind(&program.name)
    .bind(&program.provider)
    .bind(program.funding_type.as_str())
    .bind(program.funding_rate_min)
    .bind(program.funding_rate_max)
    .bind(program.min_amount)
    .bind(program.max_amount)
    .bind(serde_json::to_string(&program.target_sizes).expect("serialize"))
    .bind(program.target_group.as_str())
    .bind(program.min_company_age)
    .bind(program.max_company_age)
    .bind(serde_json::to_string(&program.legal_forms).expect("serialize"))
    .bind(serde_json::to_string(&program.industries).expect("serialize"))
    .bind(serde_json::to_string(&program.excluded_industries).expect("serialize"))
    .bind(serde_json::to_string(&program.target_states).expect("serialize"))
    .bind(serde_json::to_string(&program.topics).expect("serialize"))
    .bind(&program.requirements)
    .bind(program.deadline)
    .bind(program.deadline_type.as_str())
    .bind(program.call_start)
    .bind(program.call_end)
    .bind(&program.url)
    .bind(&program.guidelines_url)
    .bind(serde_json::to_string(&program.combinable_with).expect("serialize"))
    .bind(serde_json::to_string(&program.not_combinable_with).expect("serialize"))
    .bind(program.status.as_str())
    .bind(program.is_highlight)
    .bind(&program.source)
    .bind(&program.source_id)
    .bind(program.created_at)
    .bind(program.updated_at)
    .execute(pool)
    .await
    .expect("Failed to insert test program");
}

/// Create a stored profile that matches [`test_program`] well.
pub async fn create_test_profile(
    profile_service: &ProfileService,
    tenant_id: i64,
) -> CompanyProfile {
    profile_service
        .create(
            tenant_id,
            CreateProfileRequest {
                name: "Muster GmbH".to_string(),
                legal_form: Some("GmbH".to_string()),
                founded_year: Some(2018),
                state: Some("wien".to_string()),
                employees: Some(40),
                annual_revenue: Some(8_000_000),
                balance_total: None,
                industry: Some("IT".to_string()),
                industry_codes: vec![],
                is_startup: false,
                project_description: "Digitalisierung der Fertigung".to_string(),
                investment_amount: Some(250_000),
                project_topics: vec!["digitalisierung".to_string(), "innovation".to_string()],
            },
        )
        .await
        .expect("Failed to create test profile")
}

// ============================================================================
// Scripted analyst
// ============================================================================

/// Response script per program id.
#[derive(Clone)]
pub enum Scripted {
    Eligible(Confidence),
    Ineligible,
    TransportError,
    TimeoutError,
    /// Sleep this many milliseconds, then answer eligible/high.
    Slow(u64),
}

/// Deterministic stand-in for the HTTP analyst.
pub struct ScriptedAnalyst {
    script: HashMap<String, Scripted>,
    pub calls: AtomicU64,
}

impl ScriptedAnalyst {
    pub fn new(script: HashMap<String, Scripted>) -> Self {
        Self { script, calls: AtomicU64::new(0) }
    }

    /// Every program answered eligible with high confidence.
    pub fn always_eligible() -> Self {
        Self::new(HashMap::new())
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn verdict(eligible: bool, confidence: Confidence) -> AnalyzedVerdict {
        AnalyzedVerdict {
            verdict: LLMVerdict {
                eligible,
                confidence,
                score: Some(if eligible { 85 } else { 20 }),
                matched_criteria: vec!["KMU".to_string(), "Themenfit".to_string()],
                implicit_matches: vec![],
                concerns: vec![],
                estimated_amount: None,
                kombinierbar_mit: vec![],
                next_steps: vec![],
                insider_tipp: None,
            },
            usage: TokenUsage { input_tokens: 700, output_tokens: 150 },
        }
    }
}

#[async_trait]
impl LLMAnalyst for ScriptedAnalyst {
    async fn analyze(
        &self,
        _profile: &CompanyProfile,
        program: &Program,
    ) -> Result<AnalyzedVerdict, LLMError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match self.script.get(&program.id) {
            None => Ok(Self::verdict(true, Confidence::High)),
            Some(Scripted::Eligible(confidence)) => Ok(Self::verdict(true, *confidence)),
            Some(Scripted::Ineligible) => Ok(Self::verdict(false, Confidence::High)),
            Some(Scripted::TransportError) => {
                Err(LLMError::Transport("connection refused".to_string()))
            },
            Some(Scripted::TimeoutError) => Err(LLMError::Timeout(1)),
            Some(Scripted::Slow(ms)) => {
                tokio::time::sleep(std::time::Duration::from_millis(*ms)).await;
                Ok(Self::verdict(true, Confidence::High))
            },
        }
    }
}

// ============================================================================
// Service wiring
// ============================================================================

pub struct TestHarness {
    pub pool: SqlitePool,
    pub caches: Arc<ResultCaches>,
    pub program_service: Arc<ProgramService>,
    pub profile_service: Arc<ProfileService>,
    pub search_service: Arc<SearchService>,
    pub monitor_service: Arc<MonitorService>,
}

/// Wire the matcher stack around an optional scripted analyst.
pub async fn build_harness(analyst: Option<Arc<ScriptedAnalyst>>) -> TestHarness {
    build_harness_with(analyst, SearchConfig::default(), test_llm_config()).await
}

pub fn test_llm_config() -> LlmConfig {
    LlmConfig { fallback_enabled: true, ..LlmConfig::default() }
}

pub async fn build_harness_with(
    analyst: Option<Arc<ScriptedAnalyst>>,
    search_cfg: SearchConfig,
    llm_cfg: LlmConfig,
) -> TestHarness {
    let pool = create_test_db().await;
    let caches = Arc::new(ResultCaches::in_process());
    let program_service = Arc::new(ProgramService::new(pool.clone()));
    let profile_service = Arc::new(ProfileService::new(pool.clone(), Arc::clone(&caches)));

    let llm_client = analyst.map(|a| a as Arc<dyn LLMAnalyst>);
    let search_service = Arc::new(SearchService::new(
        pool.clone(),
        Arc::clone(&program_service),
        Arc::clone(&profile_service),
        llm_client,
        Arc::clone(&caches),
        search_cfg,
        llm_cfg,
    ));
    let monitor_service = Arc::new(MonitorService::new(pool.clone()));

    TestHarness {
        pool,
        caches,
        program_service,
        profile_service,
        search_service,
        monitor_service,
    }
}
