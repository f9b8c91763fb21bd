//! Analyst data models
//!
//! Verdict shape returned by the eligibility analyst, the failure
//! taxonomy, and token/cost accounting.

use serde::{Deserialize, Serialize};

use crate::config::ProviderPricing;

// ============================================================================
// Verdict
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Estimated funding amount as reported by the analyst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatedAmount {
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
    #[serde(default)]
    pub basis: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextStep {
    pub schritt: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub frist: Option<String>,
}

/// Structured eligibility verdict. Field names mirror the JSON contract
/// the analyst is instructed to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMVerdict {
    pub eligible: bool,
    pub confidence: Confidence,
    /// Informational 0-100 score from the analyst; the fused match score
    /// uses [`LLMVerdict::llm_score`] instead.
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub matched_criteria: Vec<String>,
    #[serde(default)]
    pub implicit_matches: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub estimated_amount: Option<EstimatedAmount>,
    #[serde(default)]
    pub kombinierbar_mit: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<NextStep>,
    #[serde(default)]
    pub insider_tipp: Option<String>,
}

impl LLMVerdict {
    /// The named fallback verdict used when the analyst is unreachable.
    pub fn fallback() -> Self {
        Self {
            eligible: true,
            confidence: Confidence::Low,
            score: None,
            matched_criteria: Vec::new(),
            implicit_matches: Vec::new(),
            concerns: vec!["Automatische Analyse nicht verfuegbar".to_string()],
            estimated_amount: None,
            kombinierbar_mit: Vec::new(),
            next_steps: vec![NextStep {
                schritt: "Foerderfaehigkeit manuell pruefen".to_string(),
                url: None,
                frist: None,
            }],
            insider_tipp: None,
        }
    }

    /// Normalized analyst score in [0, 1], derived from eligibility and
    /// confidence. Pinned by the score-fusion contract: an eligible
    /// high-confidence verdict scores 0.9.
    pub fn llm_score(&self) -> f64 {
        if !self.eligible {
            return 0.1;
        }
        match self.confidence {
            Confidence::High => 0.9,
            Confidence::Medium => 0.7,
            Confidence::Low => 0.5,
        }
    }

    /// Estimated amount collapsed to its upper bound.
    pub fn estimated_amount_max(&self) -> Option<i64> {
        self.estimated_amount.as_ref().and_then(|a| a.max.or(a.min))
    }

    /// Next steps reduced to their action strings.
    pub fn next_step_actions(&self) -> Vec<String> {
        self.next_steps.iter().map(|s| s.schritt.clone()).collect()
    }

    /// Combination hint synthesized from the combinable-with list.
    pub fn combination_hint(&self) -> Option<String> {
        if self.kombinierbar_mit.is_empty() {
            None
        } else {
            Some(format!("Kombinierbar mit: {}", self.kombinierbar_mit.join(", ")))
        }
    }
}

// ============================================================================
// Token usage and cost accounting
// ============================================================================

/// Base token estimate of the standard analyst prompt.
pub const PROMPT_BASE_TOKENS_STANDARD: i64 = 600;
/// Base token estimate of the compact analyst prompt.
pub const PROMPT_BASE_TOKENS_COMPACT: i64 = 300;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl TokenUsage {
    /// Deterministic estimator used when the provider reports no usage:
    /// prompt base plus one token per four characters of payload.
    pub fn estimate(prompt_base: i64, user_prompt_len: usize, response_len: usize) -> Self {
        Self {
            input_tokens: prompt_base + (user_prompt_len as i64) / 4,
            output_tokens: (response_len as i64) / 4,
        }
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    /// Cost in cents under the given pricing profile, rounded up.
    pub fn cost_cents(&self, pricing: &ProviderPricing) -> i64 {
        let dollars = (self.input_tokens as f64) * pricing.input_per_mtok / 1_000_000.0
            + (self.output_tokens as f64) * pricing.output_per_mtok / 1_000_000.0;
        (dollars * 100.0).ceil() as i64
    }
}

/// A parsed verdict together with the usage of the call that produced it.
#[derive(Debug, Clone)]
pub struct AnalyzedVerdict {
    pub verdict: LLMVerdict,
    pub usage: TokenUsage,
}

// ============================================================================
// Failure taxonomy
// ============================================================================

/// Analyst failure kinds. Transport, decode and schema failures are
/// upstream errors; timeout and cancellation are deadline outcomes.
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Analyst transport error: {0}")]
    Transport(String),

    #[error("Analyst response unreadable: {0}")]
    Decode(String),

    #[error("Analyst response missing required fields: {0}")]
    Schema(String),

    #[error("Analyst timeout after {0}s")]
    Timeout(u64),

    #[error("Analyst call cancelled")]
    Cancelled,

    #[error("Analyst disabled or not configured")]
    Disabled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
