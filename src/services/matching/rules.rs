//! Rule filter
//!
//! Scores a (profile, program) pair across five rules and produces the
//! candidate set for analyst review. Three rules are scored (topics, size,
//! region); deadline and funding type act as hard filters with weight 0.
//!
//! Aggregation: total = sum(weight * score) / sum(weight) over the scored
//! rules. A scored rule at exactly 0 is a hard fail, as is any failing
//! hard-filter rule.

use chrono::{DateTime, Utc};

use crate::models::program::{Program, TargetGroup};
use crate::models::profile::CompanyProfile;

/// Candidates below this total never reach the analyst.
pub const MIN_SCORE_FOR_LLM: f64 = 0.50;

/// Cap on candidates handed to the analyst fan-out per search.
pub const MAX_LLM_CANDIDATES: usize = 20;

pub const WEIGHT_TOPICS: f64 = 0.50;
pub const WEIGHT_SIZE: f64 = 0.25;
pub const WEIGHT_REGION: f64 = 0.25;

/// Outcome of a single rule evaluation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleOutcome {
    pub rule: &'static str,
    pub weight: f64,
    pub score: f64,
    pub passed: bool,
    pub reason: String,
}

/// Aggregated filter result for one (profile, program) pair.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleResult {
    pub outcomes: Vec<RuleOutcome>,
    /// Weighted total over the scored rules, within [0, 1].
    pub total: f64,
    /// False when any scored rule hit 0 or a hard filter failed.
    pub passed: bool,
}

impl RuleResult {
    /// Reasons of the passing rules, strongest contribution first. Used
    /// for notification summaries when no analyst verdict is available.
    pub fn top_reasons(&self, limit: usize) -> Vec<String> {
        let mut scored: Vec<&RuleOutcome> = self.outcomes.iter().filter(|o| o.passed).collect();
        scored.sort_by(|a, b| {
            (b.weight * b.score)
                .partial_cmp(&(a.weight * a.score))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.into_iter().take(limit).map(|o| o.reason.clone()).collect()
    }
}

/// A program that survived the rule filter and is eligible for analyst
/// review.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub program: Program,
    pub rule_result: RuleResult,
}

/// Score one pair across all five rules.
pub fn score(profile: &CompanyProfile, program: &Program, now: DateTime<Utc>) -> RuleResult {
    let outcomes = vec![
        topics_rule(profile, program),
        size_rule(profile, program),
        region_rule(profile, program),
        deadline_rule(program, now),
        funding_type_rule(program),
    ];

    let weight_sum: f64 = outcomes.iter().map(|o| o.weight).sum();
    let total = if weight_sum > 0.0 {
        outcomes.iter().map(|o| o.weight * o.score).sum::<f64>() / weight_sum
    } else {
        0.0
    };

    // A scored rule at 0 is a hard fail; a failing hard filter always is.
    let passed = outcomes.iter().all(|o| {
        if o.weight > 0.0 { o.score > 0.0 } else { o.passed }
    });

    RuleResult { outcomes, total: total.clamp(0.0, 1.0), passed }
}

/// Filter and rank programs for one profile. The result is sorted by total
/// score descending (stable: equal totals preserve catalog order) and
/// truncated to [`MAX_LLM_CANDIDATES`].
pub fn candidates(
    profile: &CompanyProfile,
    programs: Vec<Program>,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = programs
        .into_iter()
        .map(|program| {
            let rule_result = score(profile, &program, now);
            Candidate { program, rule_result }
        })
        .filter(|c| c.rule_result.passed && c.rule_result.total >= MIN_SCORE_FOR_LLM)
        .collect();

    // Vec::sort_by is stable, which keeps property "equal totals preserve
    // input order" without a secondary key.
    candidates.sort_by(|a, b| {
        b.rule_result
            .total
            .partial_cmp(&a.rule_result.total)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(MAX_LLM_CANDIDATES);
    candidates
}

// ============================================================================
// Individual rules
// ============================================================================

fn ci_overlap(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    a == b || a.contains(&b) || b.contains(&a)
}

/// Topic match: case-insensitive intersection, substring containment in
/// either direction counts. Neutral when either side declares no topics.
fn topics_rule(profile: &CompanyProfile, program: &Program) -> RuleOutcome {
    let weight = WEIGHT_TOPICS;

    if profile.project_topics.is_empty() || program.topics.is_empty() {
        return RuleOutcome {
            rule: "topics",
            weight,
            score: 0.5,
            passed: true,
            reason: "Keine Themenangaben - neutral bewertet".to_string(),
        };
    }

    let matches = program
        .topics
        .iter()
        .filter(|pt| profile.project_topics.iter().any(|t| ci_overlap(t, pt)))
        .count();

    if matches == 0 {
        return RuleOutcome {
            rule: "topics",
            weight,
            score: 0.1,
            passed: false,
            reason: "Keine Themenueberschneidung".to_string(),
        };
    }

    let score = 0.3 + 0.7 * (matches as f64 / program.topics.len() as f64);
    RuleOutcome {
        rule: "topics",
        weight,
        score,
        passed: score >= 0.5,
        reason: format!("{}/{} Programmthemen passen zum Projekt", matches, program.topics.len()),
    }
}

/// Size match against granular target sizes, falling back to the legacy
/// single target group.
fn size_rule(profile: &CompanyProfile, program: &Program) -> RuleOutcome {
    let weight = WEIGHT_SIZE;
    let size = profile.company_size();

    if !program.target_sizes.is_empty() {
        let hit = program.target_sizes.contains(&size);
        return RuleOutcome {
            rule: "size",
            weight,
            score: if hit { 1.0 } else { 0.0 },
            passed: hit,
            reason: if hit {
                format!("Unternehmensgroesse {} ist Zielgruppe", size.as_str())
            } else {
                format!("Unternehmensgroesse {} nicht in Zielgruppe", size.as_str())
            },
        };
    }

    let (score, reason) = match program.target_group {
        TargetGroup::All => (1.0, "Programm offen fuer alle Groessen".to_string()),
        TargetGroup::Sme => {
            if profile.is_sme() {
                (1.0, "KMU-Kriterien erfuellt".to_string())
            } else {
                (0.0, "Kein KMU".to_string())
            }
        },
        TargetGroup::Startup => {
            let young = profile.age_years().map(|a| a <= 5).unwrap_or(false);
            if profile.is_startup || young {
                (1.0, "Startup-Kriterien erfuellt".to_string())
            } else {
                (0.2, "Kein Startup - eingeschraenkt passend".to_string())
            }
        },
        TargetGroup::Large => {
            if profile.is_sme() {
                (0.0, "Programm richtet sich an Grossunternehmen".to_string())
            } else {
                (1.0, "Grossunternehmen ist Zielgruppe".to_string())
            }
        },
    };

    RuleOutcome { rule: "size", weight, score, passed: score > 0.0, reason }
}

/// Region match. "No state given" is scored 0.8 and is deliberately
/// distinct from "state does not match" (0).
fn region_rule(profile: &CompanyProfile, program: &Program) -> RuleOutcome {
    let weight = WEIGHT_REGION;

    let state = match &profile.state {
        Some(s) if !s.trim().is_empty() => s,
        _ => {
            return RuleOutcome {
                rule: "region",
                weight,
                score: 0.8,
                passed: true,
                reason: "Kein Bundesland angegeben".to_string(),
            };
        },
    };

    let nationwide = program.target_states.is_empty()
        || program.target_states.iter().any(|s| s.eq_ignore_ascii_case("all"));
    if nationwide {
        return RuleOutcome {
            rule: "region",
            weight,
            score: 1.0,
            passed: true,
            reason: "Oesterreichweites Programm".to_string(),
        };
    }

    let hit = program.target_states.iter().any(|s| ci_overlap(state, s));
    RuleOutcome {
        rule: "region",
        weight,
        score: if hit { 1.0 } else { 0.0 },
        passed: hit,
        reason: if hit {
            format!("Bundesland {} wird gefoerdert", state)
        } else {
            format!("Bundesland {} nicht im Zielgebiet", state)
        },
    }
}

/// Deadline hard filter (weight 0). A deadline within 7 days still passes
/// but with a lowered confidence signal.
fn deadline_rule(program: &Program, now: DateTime<Utc>) -> RuleOutcome {
    let deadline = match program.deadline {
        Some(d) => d,
        None => {
            return RuleOutcome {
                rule: "deadline",
                weight: 0.0,
                score: 1.0,
                passed: true,
                reason: "Laufende Einreichung".to_string(),
            };
        },
    };

    let days_left = (deadline - now).num_days();
    if deadline < now {
        RuleOutcome {
            rule: "deadline",
            weight: 0.0,
            score: 0.0,
            passed: false,
            reason: "Einreichfrist abgelaufen".to_string(),
        }
    } else if days_left <= 7 {
        RuleOutcome {
            rule: "deadline",
            weight: 0.0,
            score: 0.6,
            passed: true,
            reason: format!("Frist endet in {} Tagen", days_left),
        }
    } else if days_left <= 30 {
        RuleOutcome {
            rule: "deadline",
            weight: 0.0,
            score: 0.8,
            passed: true,
            reason: format!("Frist endet in {} Tagen", days_left),
        }
    } else {
        RuleOutcome {
            rule: "deadline",
            weight: 0.0,
            score: 1.0,
            passed: true,
            reason: "Ausreichend Zeit bis zur Frist".to_string(),
        }
    }
}

/// Funding type carries only a qualitative tag; every type passes.
fn funding_type_rule(program: &Program) -> RuleOutcome {
    RuleOutcome {
        rule: "funding_type",
        weight: 0.0,
        score: 1.0,
        passed: true,
        reason: format!("Foerderart: {}", program.funding_type.as_str()),
    }
}
