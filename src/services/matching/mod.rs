//! Matching pipeline types
//!
//! The rule filter lives in [`rules`]; this module adds the fused match
//! record shared by the orchestrator, the session store and the monitors.

pub mod rules;

use serde::{Deserialize, Serialize};

use super::llm::LLMVerdict;

pub use rules::{Candidate, MAX_LLM_CANDIDATES, MIN_SCORE_FOR_LLM, RuleOutcome, RuleResult};

/// One element of a search's result list.
///
/// `total_score = rule_score * W_rule + llm_score * W_llm` whenever a
/// verdict is present; without a verdict the llm score is zero and the
/// total collapses to the weighted rule score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub program_id: String,
    pub program_name: String,
    pub provider: String,
    pub rule_score: f64,
    pub llm_score: f64,
    pub total_score: f64,
    /// Reasons of the strongest passing rules, for summaries when no
    /// verdict is available.
    #[serde(default)]
    pub rule_reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<LLMVerdict>,
}

impl Match {
    /// Integer percent score used against monitor thresholds.
    pub fn percent_score(&self) -> i64 {
        (self.total_score * 100.0).round() as i64
    }
}
