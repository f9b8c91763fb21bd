//! Company profile models
//!
//! The matching subject: a company plus its project intent. Profiles are
//! tenant-scoped; derived size and SME flags follow the EU definition.

use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::program::CompanySize;
use crate::utils::{ApiError, ApiResult};

/// OENACE 2008 code shape: section letter plus optional numeric division
/// (e.g. "C", "C25", "C25.1", "J62.01").
static ONACE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-U](\d{2}(\.\d{1,2})?)?$").unwrap());

/// Industry codes are free input from clients; reject anything that is
/// not a plausible OENACE code before it lands in the store.
pub fn validate_industry_codes(codes: &[String]) -> ApiResult<()> {
    for code in codes {
        if !ONACE_CODE.is_match(code.trim()) {
            return Err(ApiError::invalid_data(format!("Invalid industry code: {}", code)));
        }
    }
    Ok(())
}

/// Coarse company-age bucket derived from the founding year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgeBucket {
    /// Founded within the last 5 years.
    Startup,
    /// Between 5 and 10 years old.
    Young,
    Established,
}

#[derive(Debug, Clone, FromRow)]
pub struct CompanyProfileRow {
    pub id: String,
    pub tenant_id: i64,
    pub name: String,
    pub legal_form: Option<String>,
    pub founded_year: Option<i64>,
    pub state: Option<String>,
    pub employees: Option<i64>,
    pub annual_revenue: Option<i64>,
    pub balance_total: Option<i64>,
    pub industry: Option<String>,
    pub industry_codes_json: String,
    pub is_startup: bool,
    pub project_description: String,
    pub investment_amount: Option<i64>,
    pub project_topics_json: String,
    pub last_search_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub id: String,
    pub tenant_id: i64,
    pub name: String,
    pub legal_form: Option<String>,
    pub founded_year: Option<i64>,
    pub state: Option<String>,
    pub employees: Option<i64>,
    pub annual_revenue: Option<i64>,
    pub balance_total: Option<i64>,
    pub industry: Option<String>,
    pub industry_codes: Vec<String>,
    pub is_startup: bool,
    pub project_description: String,
    pub investment_amount: Option<i64>,
    pub project_topics: Vec<String>,
    pub last_search_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CompanyProfileRow> for CompanyProfile {
    type Error = ApiError;

    fn try_from(row: CompanyProfileRow) -> ApiResult<Self> {
        let decode = |json: &str| -> ApiResult<Vec<String>> {
            serde_json::from_str(json)
                .map_err(|e| ApiError::internal_error(format!("Corrupt profile list column: {}", e)))
        };
        Ok(Self {
            industry_codes: decode(&row.industry_codes_json)?,
            project_topics: decode(&row.project_topics_json)?,
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            legal_form: row.legal_form,
            founded_year: row.founded_year,
            state: row.state,
            employees: row.employees,
            annual_revenue: row.annual_revenue,
            balance_total: row.balance_total,
            industry: row.industry,
            is_startup: row.is_startup,
            project_description: row.project_description,
            investment_amount: row.investment_amount,
            last_search_at: row.last_search_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl CompanyProfile {
    /// Company age in full years, if the founding year is known.
    pub fn age_years(&self) -> Option<i64> {
        self.founded_year
            .map(|y| (Utc::now().year() as i64 - y).max(0))
    }

    pub fn age_bucket(&self) -> Option<AgeBucket> {
        self.age_years().map(|age| {
            if age <= 5 {
                AgeBucket::Startup
            } else if age <= 10 {
                AgeBucket::Young
            } else {
                AgeBucket::Established
            }
        })
    }

    /// Derived size on the SME ladder.
    ///
    /// <= 1 employee is an EPU; below that the thresholds follow the EU
    /// staff-headcount and revenue ceilings. Missing employee counts fall
    /// back to micro, the most permissive assumption for matching.
    pub fn company_size(&self) -> CompanySize {
        let employees = match self.employees {
            Some(e) => e,
            None => return CompanySize::Micro,
        };
        let revenue = self.annual_revenue.unwrap_or(0);

        if employees <= 1 {
            CompanySize::Epu
        } else if employees < 10 && revenue < 2_000_000 {
            CompanySize::Micro
        } else if employees < 50 && revenue < 10_000_000 {
            CompanySize::Small
        } else if employees < 250 && revenue < 50_000_000 {
            CompanySize::Medium
        } else {
            CompanySize::Large
        }
    }

    /// EU SME definition: below 250 employees and either revenue below 50M
    /// or balance-sheet total below 43M.
    pub fn is_sme(&self) -> bool {
        if self.company_size() == CompanySize::Large {
            return false;
        }
        let revenue_ok = self.annual_revenue.map(|r| r < 50_000_000).unwrap_or(true);
        let balance_ok = self.balance_total.map(|b| b < 43_000_000).unwrap_or(true);
        revenue_ok || balance_ok
    }
}

// ============================================================================
// Request / response shapes
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateProfileRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub legal_form: Option<String>,
    #[validate(range(min = 1800, max = 2100))]
    pub founded_year: Option<i64>,
    pub state: Option<String>,
    #[validate(range(min = 0))]
    pub employees: Option<i64>,
    #[validate(range(min = 0))]
    pub annual_revenue: Option<i64>,
    #[validate(range(min = 0))]
    pub balance_total: Option<i64>,
    pub industry: Option<String>,
    #[serde(default)]
    pub industry_codes: Vec<String>,
    #[serde(default)]
    pub is_startup: bool,
    #[serde(default)]
    pub project_description: String,
    pub investment_amount: Option<i64>,
    #[serde(default)]
    pub project_topics: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub legal_form: Option<String>,
    pub founded_year: Option<i64>,
    pub state: Option<String>,
    pub employees: Option<i64>,
    pub annual_revenue: Option<i64>,
    pub balance_total: Option<i64>,
    pub industry: Option<String>,
    pub industry_codes: Option<Vec<String>>,
    pub is_startup: Option<bool>,
    pub project_description: Option<String>,
    pub investment_amount: Option<i64>,
    pub project_topics: Option<Vec<String>>,
}

/// Profile as returned to clients, with the derived matching flags.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ProfileResponse {
    pub id: String,
    pub name: String,
    pub legal_form: Option<String>,
    pub founded_year: Option<i64>,
    pub state: Option<String>,
    pub employees: Option<i64>,
    pub annual_revenue: Option<i64>,
    pub balance_total: Option<i64>,
    pub industry: Option<String>,
    pub industry_codes: Vec<String>,
    pub is_startup: bool,
    pub project_description: String,
    pub investment_amount: Option<i64>,
    pub project_topics: Vec<String>,
    pub company_size: String,
    pub is_sme: bool,
    pub age_bucket: Option<AgeBucket>,
    pub last_search_at: Option<String>,
    pub created_at: String,
}

impl From<CompanyProfile> for ProfileResponse {
    fn from(p: CompanyProfile) -> Self {
        Self {
            company_size: p.company_size().as_str().to_string(),
            is_sme: p.is_sme(),
            age_bucket: p.age_bucket(),
            last_search_at: p.last_search_at.map(|t| t.to_rfc3339()),
            created_at: p.created_at.to_rfc3339(),
            id: p.id,
            name: p.name,
            legal_form: p.legal_form,
            founded_year: p.founded_year,
            state: p.state,
            employees: p.employees,
            annual_revenue: p.annual_revenue,
            balance_total: p.balance_total,
            industry: p.industry,
            industry_codes: p.industry_codes,
            is_startup: p.is_startup,
            project_description: p.project_description,
            investment_amount: p.investment_amount,
            project_topics: p.project_topics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_industry_code_validation() {
        assert!(validate_industry_codes(&["C".to_string(), "C25.1".to_string()]).is_ok());
        assert!(validate_industry_codes(&["J62.01".to_string()]).is_ok());
        assert!(validate_industry_codes(&["25C".to_string()]).is_err());
        assert!(validate_industry_codes(&["Z99".to_string()]).is_err());
    }

    fn profile(employees: Option<i64>, revenue: Option<i64>, balance: Option<i64>) -> CompanyProfile {
        CompanyProfile {
            id: "p1".into(),
            tenant_id: 1,
            name: "Testfirma".into(),
            legal_form: Some("GmbH".into()),
            founded_year: Some(2015),
            state: None,
            employees,
            annual_revenue: revenue,
            balance_total: balance,
            industry: None,
            industry_codes: vec![],
            is_startup: false,
            project_description: String::new(),
            investment_amount: None,
            project_topics: vec![],
            last_search_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_size_ladder() {
        assert_eq!(profile(Some(1), None, None).company_size(), CompanySize::Epu);
        assert_eq!(profile(Some(5), Some(1_000_000), None).company_size(), CompanySize::Micro);
        assert_eq!(profile(Some(40), Some(8_000_000), None).company_size(), CompanySize::Small);
        assert_eq!(profile(Some(200), Some(30_000_000), None).company_size(), CompanySize::Medium);
        assert_eq!(profile(Some(300), Some(10_000_000), None).company_size(), CompanySize::Large);
        // Revenue pushes a small headcount over the micro ceiling.
        assert_eq!(profile(Some(8), Some(5_000_000), None).company_size(), CompanySize::Small);
    }

    #[test]
    fn test_sme_definition() {
        assert!(profile(Some(40), Some(8_000_000), None).is_sme());
        // Large headcount is never an SME.
        assert!(!profile(Some(400), Some(1_000_000), None).is_sme());
        // Medium size with high revenue but a small balance sheet still qualifies.
        assert!(profile(Some(200), Some(40_000_000), Some(20_000_000)).is_sme());
        // Revenue at the ceiling tips the derived size to large.
        assert!(!profile(Some(200), Some(60_000_000), Some(20_000_000)).is_sme());
    }
}
