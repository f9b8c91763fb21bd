//! Funding program catalog models
//!
//! A `Program` is one public funding instrument (grant, loan, guarantee,
//! advisory or a combination). The catalog is tenant-agnostic; rows are
//! created by imports and soft-closed rather than deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::{ApiError, ApiResult};

// ============================================================================
// Enumerations
// ============================================================================

/// Company size on the EU SME ladder, smallest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanySize {
    /// One-person enterprise (Ein-Personen-Unternehmen)
    Epu,
    Micro,
    Small,
    Medium,
    Large,
}

impl CompanySize {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epu => "epu",
            Self::Micro => "micro",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }

    /// All sizes that qualify as SME.
    pub fn sme_sizes() -> &'static [CompanySize] {
        &[Self::Epu, Self::Micro, Self::Small, Self::Medium]
    }
}

/// Funding instrument type. All types pass the rule filter; the type only
/// carries a qualitative tag into the match result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingType {
    Grant,
    Loan,
    Guarantee,
    Advisory,
    Combined,
}

impl FundingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Loan => "loan",
            Self::Guarantee => "guarantee",
            Self::Advisory => "advisory",
            Self::Combined => "combined",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "loan" => Self::Loan,
            "guarantee" => Self::Guarantee,
            "advisory" => Self::Advisory,
            "combined" => Self::Combined,
            _ => Self::Grant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineType {
    /// Hard cut-off date; overdue programs are expired by the catalog sweep.
    Fixed,
    /// Laufende Einreichung - submissions accepted continuously.
    Rolling,
    BudgetExhausted,
}

impl DeadlineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Rolling => "rolling",
            Self::BudgetExhausted => "budget_exhausted",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "fixed" => Self::Fixed,
            "budget_exhausted" => Self::BudgetExhausted,
            _ => Self::Rolling,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    Active,
    Upcoming,
    Paused,
    Closed,
}

impl ProgramStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Upcoming => "upcoming",
            Self::Paused => "paused",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "upcoming" => Self::Upcoming,
            "paused" => Self::Paused,
            _ => Self::Closed,
        }
    }
}

/// Legacy single-value target group, consulted by the size rule when a
/// program carries no granular `target_sizes` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetGroup {
    All,
    Sme,
    Startup,
    Large,
}

impl TargetGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Sme => "sme",
            Self::Startup => "startup",
            Self::Large => "large",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sme" => Self::Sme,
            "startup" => Self::Startup,
            "large" => Self::Large,
            _ => Self::All,
        }
    }
}

// ============================================================================
// Provider tiers
// ============================================================================

/// Administrative tier of a funding provider, used by the combination
/// analyzer's cross-tier inference rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    Federal,
    State,
    Eu,
    /// Provider not in the known tier tables. Combination inference
    /// degrades to "consult provider" for these.
    Unknown,
}

/// Federal-level agencies. WKO is treated as federal here.
const FEDERAL_PROVIDERS: &[&str] = &["ffg", "aws", "wko", "ams", "kpc", "bmaw", "oeht"];

/// State (Bundesland) agencies.
const STATE_PROVIDERS: &[&str] = &[
    "sfg",                    // Steiermark
    "wirtschaftsagentur wien",
    "ecoplus",                // Niederoesterreich
    "standortagentur tirol",
    "itg salzburg",
    "wibag",                  // Burgenland
    "kwf",                    // Kaernten
    "business upper austria",
    "wisto",                  // Vorarlberg
];

impl ProviderTier {
    /// Classify a provider string against the known tier tables.
    pub fn classify(provider: &str) -> Self {
        let p = provider.trim().to_lowercase();
        if p == "eu" || p.starts_with("eu ") || p.contains("european commission") {
            return Self::Eu;
        }
        if FEDERAL_PROVIDERS.iter().any(|f| p == *f || p.starts_with(&format!("{f} "))) {
            return Self::Federal;
        }
        if STATE_PROVIDERS.iter().any(|s| p.contains(s)) {
            return Self::State;
        }
        Self::Unknown
    }

    /// Federal and state tiers are both "national" for the EU inference rule.
    pub fn is_national(&self) -> bool {
        matches!(self, Self::Federal | Self::State)
    }
}

// ============================================================================
// Program
// ============================================================================

/// Raw database row. List-valued columns are stored as JSON text and
/// decoded into [`Program`].
#[derive(Debug, Clone, FromRow)]
pub struct ProgramRow {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub funding_type: String,
    pub funding_rate_min: f64,
    pub funding_rate_max: f64,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    pub target_sizes_json: String,
    pub target_group: String,
    pub min_company_age: Option<i64>,
    pub max_company_age: Option<i64>,
    pub legal_forms_json: String,
    pub industries_json: String,
    pub excluded_industries_json: String,
    pub target_states_json: String,
    pub topics_json: String,
    pub requirements: String,
    pub deadline: Option<DateTime<Utc>>,
    pub deadline_type: String,
    pub call_start: Option<DateTime<Utc>>,
    pub call_end: Option<DateTime<Utc>>,
    pub url: String,
    pub guidelines_url: Option<String>,
    pub combinable_with_json: String,
    pub not_combinable_with_json: String,
    pub status: String,
    pub is_highlight: bool,
    pub source: String,
    pub source_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A funding opportunity with decoded list fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub funding_type: FundingType,
    pub funding_rate_min: f64,
    pub funding_rate_max: f64,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    /// Granular target sizes. Empty means "consult `target_group`".
    pub target_sizes: Vec<CompanySize>,
    pub target_group: TargetGroup,
    pub min_company_age: Option<i64>,
    pub max_company_age: Option<i64>,
    pub legal_forms: Vec<String>,
    pub industries: Vec<String>,
    pub excluded_industries: Vec<String>,
    pub target_states: Vec<String>,
    pub topics: Vec<String>,
    pub requirements: String,
    pub deadline: Option<DateTime<Utc>>,
    pub deadline_type: DeadlineType,
    pub call_start: Option<DateTime<Utc>>,
    pub call_end: Option<DateTime<Utc>>,
    pub url: String,
    pub guidelines_url: Option<String>,
    pub combinable_with: Vec<String>,
    pub not_combinable_with: Vec<String>,
    pub status: ProgramStatus,
    pub is_highlight: bool,
    pub source: String,
    pub source_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ProgramRow> for Program {
    type Error = ApiError;

    fn try_from(row: ProgramRow) -> ApiResult<Self> {
        Ok(Self {
            funding_type: FundingType::parse(&row.funding_type),
            deadline_type: DeadlineType::parse(&row.deadline_type),
            status: ProgramStatus::parse(&row.status),
            target_group: TargetGroup::parse(&row.target_group),
            target_sizes: decode_list(&row.target_sizes_json)?,
            legal_forms: decode_list(&row.legal_forms_json)?,
            industries: decode_list(&row.industries_json)?,
            excluded_industries: decode_list(&row.excluded_industries_json)?,
            target_states: decode_list(&row.target_states_json)?,
            topics: decode_list(&row.topics_json)?,
            combinable_with: decode_list(&row.combinable_with_json)?,
            not_combinable_with: decode_list(&row.not_combinable_with_json)?,
            id: row.id,
            name: row.name,
            provider: row.provider,
            funding_rate_min: row.funding_rate_min,
            funding_rate_max: row.funding_rate_max,
            min_amount: row.min_amount,
            max_amount: row.max_amount,
            min_company_age: row.min_company_age,
            max_company_age: row.max_company_age,
            requirements: row.requirements,
            deadline: row.deadline,
            call_start: row.call_start,
            call_end: row.call_end,
            url: row.url,
            guidelines_url: row.guidelines_url,
            is_highlight: row.is_highlight,
            source: row.source,
            source_id: row.source_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn decode_list<T: serde::de::DeserializeOwned>(json: &str) -> ApiResult<Vec<T>> {
    if json.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(json)
        .map_err(|e| ApiError::internal_error(format!("Corrupt catalog list column: {}", e)))
}

impl Program {
    pub fn provider_tier(&self) -> ProviderTier {
        ProviderTier::classify(&self.provider)
    }

    /// Catalog invariants checked on import paths and in tests.
    pub fn check_invariants(&self) -> ApiResult<()> {
        if self.funding_rate_min > self.funding_rate_max {
            return Err(ApiError::invalid_data("funding_rate_min exceeds funding_rate_max"));
        }
        if let (Some(min), Some(max)) = (self.min_amount, self.max_amount)
            && min > max
        {
            return Err(ApiError::invalid_data("min_amount exceeds max_amount"));
        }
        if self
            .combinable_with
            .iter()
            .any(|id| self.not_combinable_with.contains(id))
        {
            return Err(ApiError::invalid_data(
                "combinable_with and not_combinable_with overlap",
            ));
        }
        Ok(())
    }
}
