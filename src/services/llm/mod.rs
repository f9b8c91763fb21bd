//! LLM analyst module
//!
//! Transforms a (profile, program) pair into a structured eligibility
//! verdict via an external chat-completion endpoint.

pub mod client;
pub mod models;
pub mod prompt;

use async_trait::async_trait;

use crate::models::profile::CompanyProfile;
use crate::models::program::Program;

pub use client::{LLMClient, parse_verdict};
pub use models::{
    AnalyzedVerdict, Confidence, EstimatedAmount, LLMError, LLMVerdict, NextStep, TokenUsage,
};

/// The analyst seam the orchestrator fans out against. [`LLMClient`] is
/// the HTTP implementation; tests substitute scripted analysts.
#[async_trait]
pub trait LLMAnalyst: Send + Sync {
    async fn analyze(
        &self,
        profile: &CompanyProfile,
        program: &Program,
    ) -> Result<AnalyzedVerdict, LLMError>;
}

#[async_trait]
impl LLMAnalyst for LLMClient {
    async fn analyze(
        &self,
        profile: &CompanyProfile,
        program: &Program,
    ) -> Result<AnalyzedVerdict, LLMError> {
        LLMClient::analyze(self, profile, program).await
    }
}
