//! Matcher orchestrator
//!
//! Drives the pipeline: rule filter, bounded analyst fan-out, score
//! fusion, session persistence. Session states are persisted before their
//! long-running work begins so observers always see progress.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use super::llm::{AnalyzedVerdict, LLMAnalyst, LLMError, LLMVerdict, TokenUsage};
use super::matching::{Candidate, Match, rules};
use super::profile_service::ProfileService;
use super::program_service::ProgramService;
use super::result_cache::{ResultCache, ResultCaches, search_cache_key, verdict_cache_key};
use crate::config::{LlmConfig, SearchConfig};
use crate::models::profile::{CompanyProfile, CreateProfileRequest};
use crate::models::search::{SearchSession, SearchStatus};
use crate::utils::{ApiError, ApiResult};

/// Input of one matching run. The profile is either stored (by id) or
/// supplied inline for an ad-hoc search.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct SearchInput {
    #[serde(skip)]
    pub tenant_id: i64,
    pub profile_id: Option<String>,
    pub profile: Option<CreateProfileRequest>,
    #[serde(skip)]
    pub created_by: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SearchOutput {
    pub session_id: String,
    pub profile_id: String,
    pub total_programs: i64,
    pub total_matches: i64,
    #[schema(value_type = Vec<Object>)]
    pub matches: Vec<Match>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_cents: i64,
    pub duration_ms: i64,
    /// True when the analyst phase was skipped entirely (no client
    /// configured). Per-candidate fallback keeps this false.
    pub llm_fallback: bool,
    #[serde(default)]
    pub from_cache: bool,
}

/// Per-candidate outcome of the analyst phase.
enum VerdictOutcome {
    /// Parsed verdict, either fresh or from the verdict cache.
    Verdict(LLMVerdict),
    /// Analyst failed for this candidate; the fallback verdict is carried
    /// for display but the llm score stays zero.
    Fallback(LLMVerdict),
    /// No analyst configured.
    RuleOnly,
}

#[derive(Clone)]
pub struct SearchService {
    pool: SqlitePool,
    program_service: Arc<ProgramService>,
    profile_service: Arc<ProfileService>,
    llm_client: Option<Arc<dyn LLMAnalyst>>,
    caches: Arc<ResultCaches>,
    search_cfg: SearchConfig,
    llm_cfg: LlmConfig,
}

impl SearchService {
    pub fn new(
        pool: SqlitePool,
        program_service: Arc<ProgramService>,
        profile_service: Arc<ProfileService>,
        llm_client: Option<Arc<dyn LLMAnalyst>>,
        caches: Arc<ResultCaches>,
        search_cfg: SearchConfig,
        llm_cfg: LlmConfig,
    ) -> Self {
        Self {
            pool,
            program_service,
            profile_service,
            llm_client,
            caches,
            search_cfg,
            llm_cfg,
        }
    }

    /// Run one end-to-end match. Persists a session and returns the fused
    /// result list.
    pub async fn run(&self, input: SearchInput) -> ApiResult<SearchOutput> {
        let started = Instant::now();

        // Idempotent retry: an existing session under the same key wins.
        if let Some(key) = &input.idempotency_key
            && let Some(session) = self.find_by_idempotency_key(input.tenant_id, key).await?
        {
            tracing::info!("Search replay for idempotency key {}", key);
            return self.output_from_session(&session, true);
        }

        let (profile, stored_profile) = self.resolve_profile(&input).await?;

        // Whole-search cache: only stored profiles are re-run often enough
        // to memoize.
        if stored_profile
            && let Some(bytes) = self.caches.search.get(&search_cache_key(&profile.id)).await
            && let Ok(mut output) = serde_json::from_slice::<SearchOutput>(&bytes)
        {
            tracing::info!("Search cache hit for profile {}", profile.id);
            output.from_cache = true;
            return Ok(output);
        }

        let session_id = self
            .create_session(input.tenant_id, &profile.id, input.created_by.as_deref(), input.idempotency_key.as_deref())
            .await?;

        match self.execute(&session_id, &profile).await {
            Ok((matches, total_programs, usage)) => {
                let cost_cents = usage.cost_cents(&self.llm_cfg.pricing);
                let matches_json = serde_json::to_string(&matches)?;
                self.complete_session(&session_id, &matches_json, matches.len() as i64, usage, cost_cents)
                    .await?;

                if stored_profile {
                    self.profile_service.touch_last_search(&profile.id).await?;
                }

                let output = SearchOutput {
                    session_id,
                    profile_id: profile.id.clone(),
                    total_programs,
                    total_matches: matches.len() as i64,
                    matches,
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    cost_cents,
                    duration_ms: started.elapsed().as_millis() as i64,
                    llm_fallback: self.llm_client.is_none(),
                    from_cache: false,
                };

                if stored_profile {
                    let ttl = Duration::from_secs((self.search_cfg.cache_ttl_hours.max(0) as u64) * 3600);
                    self.caches
                        .search
                        .set(&search_cache_key(&profile.id), serde_json::to_vec(&output)?, ttl)
                        .await;
                }

                Ok(output)
            },
            Err(err) => {
                let message = err.to_string();
                if let Err(persist_err) = self.fail_session(&session_id, &message).await {
                    tracing::error!("Failed to persist failed session {}: {}", session_id, persist_err);
                }
                Err(err)
            },
        }
    }

    /// The pipeline body. Any error here moves the session to `failed`.
    async fn execute(
        &self,
        session_id: &str,
        profile: &CompanyProfile,
    ) -> ApiResult<(Vec<Match>, i64, TokenUsage)> {
        let programs = self.program_service.list_active().await?;
        let total_programs = programs.len() as i64;

        self.transition(session_id, SearchStatus::RuleFiltering, Some(total_programs))
            .await?;
        let candidates = rules::candidates(profile, programs, Utc::now());
        tracing::info!(
            "Session {}: {} of {} programs passed the rule filter",
            session_id,
            candidates.len(),
            total_programs
        );

        let mut usage = TokenUsage::default();
        let outcomes = match (&self.llm_client, candidates.is_empty()) {
            (Some(client), false) => {
                self.transition(session_id, SearchStatus::LlmAnalysis, None).await?;
                self.analyze_candidates(client.clone(), profile, &candidates, &mut usage)
                    .await?
            },
            _ => candidates.iter().map(|_| VerdictOutcome::RuleOnly).collect(),
        };

        let w_rule = self.search_cfg.rule_score_weight;
        let w_llm = self.search_cfg.llm_score_weight;

        let mut matches: Vec<Match> = candidates
            .iter()
            .zip(outcomes)
            .map(|(candidate, outcome)| fuse_match(candidate, outcome, w_rule, w_llm))
            .collect();

        matches.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(self.search_cfg.max_results);

        Ok((matches, total_programs, usage))
    }

    /// Bounded analyst fan-out with a per-call deadline and an umbrella
    /// deadline over the whole phase. Verdicts are memoized per
    /// (profile, program) fingerprint.
    async fn analyze_candidates(
        &self,
        client: Arc<dyn LLMAnalyst>,
        profile: &CompanyProfile,
        candidates: &[Candidate],
        usage: &mut TokenUsage,
    ) -> ApiResult<Vec<VerdictOutcome>> {
        let ttl = Duration::from_secs((self.search_cfg.cache_ttl_hours.max(0) as u64) * 3600);
        let mut cached: HashMap<usize, LLMVerdict> = HashMap::new();
        let mut keys: Vec<String> = Vec::with_capacity(candidates.len());

        for (idx, candidate) in candidates.iter().enumerate() {
            let key = verdict_cache_key(profile, &candidate.program);
            if let Some(bytes) = self.caches.verdict.get(&key).await
                && let Ok(verdict) = serde_json::from_slice::<LLMVerdict>(&bytes)
            {
                cached.insert(idx, verdict);
            }
            keys.push(key);
        }

        let results: Arc<AsyncMutex<HashMap<usize, Result<AnalyzedVerdict, LLMError>>>> =
            Arc::new(AsyncMutex::new(HashMap::new()));
        let semaphore = Arc::new(Semaphore::new(self.llm_cfg.max_concurrent));
        let profile_shared = Arc::new(profile.clone());
        let per_call = Duration::from_secs(self.llm_cfg.timeout_secs);

        let mut tasks = JoinSet::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            if cached.contains_key(&idx) {
                continue;
            }
            let client = client.clone();
            let semaphore = semaphore.clone();
            let results = results.clone();
            let profile = profile_shared.clone();
            let program = candidate.program.clone();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let outcome = match tokio::time::timeout(per_call, client.analyze(&profile, &program)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(LLMError::Timeout(per_call.as_secs())),
                };
                results.lock().await.insert(idx, outcome);
            });
        }

        // Umbrella deadline over the whole phase. In-flight results already
        // collected are used; candidates cut off here take the fallback
        // path.
        let umbrella = Duration::from_secs(self.search_cfg.timeout_secs);
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(umbrella, drain).await.is_err() {
            tracing::warn!(
                "Search umbrella timeout after {}s, cancelling outstanding analyst calls",
                umbrella.as_secs()
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        let mut collected = {
            let mut guard = results.lock().await;
            std::mem::take(&mut *guard)
        };

        let mut outcomes = Vec::with_capacity(candidates.len());
        for (idx, _candidate) in candidates.iter().enumerate() {
            if let Some(verdict) = cached.remove(&idx) {
                outcomes.push(VerdictOutcome::Verdict(verdict));
                continue;
            }
            match collected.remove(&idx) {
                Some(Ok(analyzed)) => {
                    usage.add(analyzed.usage);
                    let bytes = serde_json::to_vec(&analyzed.verdict)?;
                    self.caches.verdict.set(&keys[idx], bytes, ttl).await;
                    outcomes.push(VerdictOutcome::Verdict(analyzed.verdict));
                },
                Some(Err(err)) => {
                    tracing::warn!("Analyst call failed for candidate {}: {}", idx, err);
                    if self.llm_cfg.fallback_enabled {
                        outcomes.push(VerdictOutcome::Fallback(LLMVerdict::fallback()));
                    } else {
                        return Err(map_llm_error(err));
                    }
                },
                // Cut off by the umbrella deadline.
                None => outcomes.push(VerdictOutcome::Fallback(LLMVerdict::fallback())),
            }
        }

        Ok(outcomes)
    }

    async fn resolve_profile(&self, input: &SearchInput) -> ApiResult<(CompanyProfile, bool)> {
        if let Some(profile_id) = &input.profile_id {
            let profile = self.profile_service.get(input.tenant_id, profile_id).await?;
            return Ok((profile, true));
        }

        let inline = input.profile.clone().ok_or_else(|| {
            ApiError::invalid_data("Either profile_id or an inline profile is required")
        })?;

        let now = Utc::now();
        Ok((
            CompanyProfile {
                id: format!("inline-{}", Uuid::new_v4()),
                tenant_id: input.tenant_id,
                name: inline.name,
                legal_form: inline.legal_form,
                founded_year: inline.founded_year,
                state: inline.state,
                employees: inline.employees,
                annual_revenue: inline.annual_revenue,
                balance_total: inline.balance_total,
                industry: inline.industry,
                industry_codes: inline.industry_codes,
                is_startup: inline.is_startup,
                project_description: inline.project_description,
                investment_amount: inline.investment_amount,
                project_topics: inline.project_topics,
                last_search_at: None,
                created_at: now,
                updated_at: now,
            },
            false,
        ))
    }

    // ========================================================================
    // Session persistence
    // ========================================================================

    async fn create_session(
        &self,
        tenant_id: i64,
        profile_id: &str,
        created_by: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> ApiResult<String> {
        let session_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"INSERT INTO search_sessions
               (id, tenant_id, profile_id, status, phase, progress, started_at,
                created_by, idempotency_key)
               VALUES (?, ?, ?, 'pending', 'pending', 0, ?, ?, ?)"#,
        )
        .bind(&session_id)
        .bind(tenant_id)
        .bind(profile_id)
        .bind(Utc::now())
        .bind(created_by)
        .bind(idempotency_key)
        .execute(&self.pool)
        .await?;

        Ok(session_id)
    }

    async fn transition(
        &self,
        session_id: &str,
        status: SearchStatus,
        total_programs: Option<i64>,
    ) -> ApiResult<()> {
        if let Some(total) = total_programs {
            sqlx::query(
                "UPDATE search_sessions SET status = ?, phase = ?, progress = ?, total_programs = ? WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(status.as_str())
            .bind(status.progress())
            .bind(total)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("UPDATE search_sessions SET status = ?, phase = ?, progress = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(status.as_str())
                .bind(status.progress())
                .bind(session_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn complete_session(
        &self,
        session_id: &str,
        matches_json: &str,
        total_matches: i64,
        usage: TokenUsage,
        cost_cents: i64,
    ) -> ApiResult<()> {
        sqlx::query(
            r#"UPDATE search_sessions SET
               status = 'completed', phase = 'completed', progress = 100,
               completed_at = ?, total_matches = ?, matches_json = ?,
               input_tokens = ?, output_tokens = ?, cost_cents = ?
               WHERE id = ?"#,
        )
        .bind(Utc::now())
        .bind(total_matches)
        .bind(matches_json)
        .bind(usage.input_tokens)
        .bind(usage.output_tokens)
        .bind(cost_cents)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_session(&self, session_id: &str, message: &str) -> ApiResult<()> {
        sqlx::query(
            r#"UPDATE search_sessions SET
               status = 'failed', phase = 'failed', progress = 100,
               completed_at = ?, error_message = ?
               WHERE id = ?"#,
        )
        .bind(Utc::now())
        .bind(message)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_idempotency_key(
        &self,
        tenant_id: i64,
        key: &str,
    ) -> ApiResult<Option<SearchSession>> {
        let session: Option<SearchSession> = sqlx::query_as(
            "SELECT * FROM search_sessions WHERE tenant_id = ? AND idempotency_key = ?",
        )
        .bind(tenant_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    pub async fn get_session(&self, tenant_id: i64, id: &str) -> ApiResult<SearchSession> {
        let session: Option<SearchSession> =
            sqlx::query_as("SELECT * FROM search_sessions WHERE id = ? AND tenant_id = ?")
                .bind(id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;

        session.ok_or_else(|| ApiError::not_found(format!("Search session {} not found", id)))
    }

    pub async fn list_sessions(&self, tenant_id: i64) -> ApiResult<Vec<SearchSession>> {
        let sessions: Vec<SearchSession> = sqlx::query_as(
            "SELECT * FROM search_sessions WHERE tenant_id = ? ORDER BY started_at DESC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    pub async fn list_sessions_by_profile(
        &self,
        tenant_id: i64,
        profile_id: &str,
    ) -> ApiResult<Vec<SearchSession>> {
        let sessions: Vec<SearchSession> = sqlx::query_as(
            r#"SELECT * FROM search_sessions
               WHERE tenant_id = ? AND profile_id = ? ORDER BY started_at DESC"#,
        )
        .bind(tenant_id)
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    fn output_from_session(&self, session: &SearchSession, from_cache: bool) -> ApiResult<SearchOutput> {
        let matches: Vec<Match> = serde_json::from_str(&session.matches_json)?;
        Ok(SearchOutput {
            session_id: session.id.clone(),
            profile_id: session.profile_id.clone(),
            total_programs: session.total_programs,
            total_matches: session.total_matches,
            matches,
            input_tokens: session.input_tokens,
            output_tokens: session.output_tokens,
            cost_cents: session.cost_cents,
            duration_ms: 0,
            llm_fallback: false,
            from_cache,
        })
    }
}

/// Fuse one candidate with its analyst outcome.
///
/// With a verdict present: total = rule * w_rule + llm * w_llm. The
/// fallback verdict carries an llm score of zero, so a degraded candidate
/// collapses to its weighted rule score.
fn fuse_match(candidate: &Candidate, outcome: VerdictOutcome, w_rule: f64, w_llm: f64) -> Match {
    let rule_score = candidate.rule_result.total;
    let (verdict, llm_score) = match outcome {
        VerdictOutcome::Verdict(v) => {
            let score = v.llm_score();
            (Some(v), score)
        },
        VerdictOutcome::Fallback(v) => (Some(v), 0.0),
        VerdictOutcome::RuleOnly => (None, 0.0),
    };

    let total_score = if verdict.is_some() {
        rule_score * w_rule + llm_score * w_llm
    } else {
        rule_score * w_rule
    };

    Match {
        program_id: candidate.program.id.clone(),
        program_name: candidate.program.name.clone(),
        provider: candidate.program.provider.clone(),
        rule_score,
        llm_score,
        total_score: total_score.clamp(0.0, 1.0),
        rule_reasons: candidate.rule_result.top_reasons(3),
        verdict,
    }
}

fn map_llm_error(err: LLMError) -> ApiError {
    match err {
        LLMError::Timeout(secs) => ApiError::AnalystTimeout(secs),
        LLMError::Cancelled => ApiError::upstream("Analysis cancelled"),
        other => ApiError::upstream(other.to_string()),
    }
}
