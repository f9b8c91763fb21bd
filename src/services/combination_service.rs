//! Combination analyzer
//!
//! Given a primary program, enumerates explicitly compatible programs,
//! explicit exclusions, and compatibilities inferred from provider tiers
//! (federal vs. state, EU vs. national). Unknown providers degrade to a
//! "consult provider" verdict instead of a guess.

use serde::Serialize;
use std::sync::Arc;

use super::program_service::ProgramService;
use crate::models::program::{Program, ProviderTier};
use crate::utils::ApiResult;

/// How a pair of programs was judged combinable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationVerdict {
    /// The catalog explicitly forbids the pair.
    ExplicitNo,
    /// The catalog explicitly allows the pair.
    ExplicitYes,
    /// Allowed by a cross-tier inference rule.
    InferredYes,
    /// No catalog data and no applicable inference rule.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceRule {
    FederalWithState,
    EuWithNational,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CombinationOption {
    pub program_id: String,
    pub program_name: String,
    pub provider: String,
    /// Hint set when both programs come from the same provider.
    pub same_provider: bool,
    pub max_amount: Option<i64>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ExcludedCombination {
    pub program_id: String,
    pub program_name: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct InferredCombination {
    pub program_id: String,
    pub program_name: String,
    pub provider: String,
    #[schema(value_type = String)]
    pub rule: InferenceRule,
    /// Conservative caveat; inferred pairs are never a guarantee.
    pub warning: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CombinationAnalysis {
    pub program_id: String,
    pub program_name: String,
    pub explicit: Vec<CombinationOption>,
    /// Running sum of the primary's and explicit partners' max amounts.
    pub combined_max_amount: i64,
    pub excluded: Vec<ExcludedCombination>,
    pub inferred: Vec<InferredCombination>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct PairValidation {
    pub program_a: String,
    pub program_b: String,
    /// None when the combination cannot be judged from catalog data.
    pub is_valid: Option<bool>,
    #[schema(value_type = String)]
    pub verdict: CombinationVerdict,
    pub message: String,
}

#[derive(Clone)]
pub struct CombinationService {
    program_service: Arc<ProgramService>,
}

impl CombinationService {
    pub fn new(program_service: Arc<ProgramService>) -> Self {
        Self { program_service }
    }

    /// Full combination picture for one primary program.
    pub async fn analyze(&self, program_id: &str) -> ApiResult<CombinationAnalysis> {
        let primary = self.program_service.get(program_id).await?;
        let catalog = self.program_service.list_active().await?;

        let mut explicit = Vec::new();
        let mut combined_max_amount = primary.max_amount.unwrap_or(0);
        for partner_id in &primary.combinable_with {
            // Explicit references may point at closed programs; resolve
            // against the full catalog store.
            let partner = match self.program_service.get(partner_id).await {
                Ok(p) => p,
                Err(_) => {
                    tracing::warn!(
                        "Program {} references unknown combination partner {}",
                        primary.id,
                        partner_id
                    );
                    continue;
                },
            };
            combined_max_amount += partner.max_amount.unwrap_or(0);
            explicit.push(CombinationOption {
                same_provider: partner.provider.eq_ignore_ascii_case(&primary.provider),
                program_id: partner.id,
                program_name: partner.name,
                provider: partner.provider,
                max_amount: partner.max_amount,
            });
        }

        let mut excluded = Vec::new();
        for partner_id in &primary.not_combinable_with {
            let name = self
                .program_service
                .get(partner_id)
                .await
                .map(|p| p.name)
                .unwrap_or_else(|_| partner_id.clone());
            excluded.push(ExcludedCombination { program_id: partner_id.clone(), program_name: name });
        }

        let inferred = infer_combinations(&primary, &catalog);

        Ok(CombinationAnalysis {
            program_id: primary.id,
            program_name: primary.name,
            explicit,
            combined_max_amount,
            excluded,
            inferred,
        })
    }

    /// Judge one pair. Precedence: explicit-no over explicit-yes over
    /// inferred-yes over unknown; symmetric in its arguments.
    pub async fn validate_pair(&self, id_a: &str, id_b: &str) -> ApiResult<PairValidation> {
        let a = self.program_service.get(id_a).await?;
        let b = self.program_service.get(id_b).await?;

        let (verdict, message) = judge_pair(&a, &b);
        Ok(PairValidation {
            program_a: a.id,
            program_b: b.id,
            is_valid: match verdict {
                CombinationVerdict::ExplicitNo => Some(false),
                CombinationVerdict::ExplicitYes | CombinationVerdict::InferredYes => Some(true),
                CombinationVerdict::Unknown => None,
            },
            verdict,
            message,
        })
    }
}

fn judge_pair(a: &Program, b: &Program) -> (CombinationVerdict, String) {
    let explicit_no =
        a.not_combinable_with.contains(&b.id) || b.not_combinable_with.contains(&a.id);
    if explicit_no {
        return (
            CombinationVerdict::ExplicitNo,
            format!("{} und {} schliessen einander laut Katalog aus", a.name, b.name),
        );
    }

    let explicit_yes = a.combinable_with.contains(&b.id) || b.combinable_with.contains(&a.id);
    if explicit_yes {
        return (
            CombinationVerdict::ExplicitYes,
            format!("{} und {} sind laut Katalog kombinierbar", a.name, b.name),
        );
    }

    if let Some(rule) = tier_inference(a.provider_tier(), b.provider_tier()) {
        let message = match rule {
            InferenceRule::FederalWithState => {
                "Bundes- und Landesfoerderung sind ueblicherweise kombinierbar; Kumulierungsgrenzen bei den Foerderstellen pruefen"
            },
            InferenceRule::EuWithNational => {
                "EU- und nationale Foerderung sind ueblicherweise kombinierbar; Beihilferecht und Kumulierungsgrenzen pruefen"
            },
        };
        return (CombinationVerdict::InferredYes, message.to_string());
    }

    (
        CombinationVerdict::Unknown,
        "Keine Katalogdaten zur Kombination - bitte bei den Foerderstellen nachfragen".to_string(),
    )
}

fn tier_inference(a: ProviderTier, b: ProviderTier) -> Option<InferenceRule> {
    match (a, b) {
        (ProviderTier::Federal, ProviderTier::State)
        | (ProviderTier::State, ProviderTier::Federal) => Some(InferenceRule::FederalWithState),
        (ProviderTier::Eu, other) if other.is_national() => Some(InferenceRule::EuWithNational),
        (other, ProviderTier::Eu) if other.is_national() => Some(InferenceRule::EuWithNational),
        _ => None,
    }
}

/// Inferred partners from the active catalog, filtered against explicit
/// exclusions and explicit compatibilities.
fn infer_combinations(primary: &Program, catalog: &[Program]) -> Vec<InferredCombination> {
    let primary_tier = primary.provider_tier();
    catalog
        .iter()
        .filter(|other| other.id != primary.id)
        .filter(|other| !primary.combinable_with.contains(&other.id))
        .filter(|other| {
            !primary.not_combinable_with.contains(&other.id)
                && !other.not_combinable_with.contains(&primary.id)
        })
        .filter_map(|other| {
            let rule = tier_inference(primary_tier, other.provider_tier())?;
            let warning = match rule {
                InferenceRule::FederalWithState => {
                    "Kumulierungsgrenzen beachten - verbindliche Auskunft nur von den Foerderstellen"
                },
                InferenceRule::EuWithNational => {
                    "Beihilferechtliche Obergrenzen beachten - verbindliche Auskunft nur von den Foerderstellen"
                },
            };
            Some(InferredCombination {
                program_id: other.id.clone(),
                program_name: other.name.clone(),
                provider: other.provider.clone(),
                rule,
                warning: warning.to_string(),
            })
        })
        .collect()
}
