//! Full rule set validation
//!
//! Pre-deployment validation pipeline: structural checks, per-category
//! policy, numeric sanity checks on configured thresholds, compatibility
//! and redundancy tables, dependency/cycle checks, regulatory coverage
//! suggestions, and a performance/gas heuristic. Findings are aggregated
//! into errors (block deployment), warnings (reduce the score), and
//! suggestions (advisory only), plus a 0-100 quality score.
//!
//! Unlike the lighter service-level dependency check, circular
//! dependencies here are hard errors.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::dependency::DependencyValidator;
use crate::model::{Condition, RuleDefinition, RuleSet, TemplateCategory};

/// Aggregated validation outcome.
///
/// `valid` is strictly `errors.is_empty()`; warnings and suggestions
/// never affect validity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    pub score: u8,
}

/// Structural validation outcome for a single rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleRuleReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Per-category validation policy
struct CategoryPolicy {
    required_rules: &'static [&'static str],
    required_metadata: &'static [&'static str],
    min_rules: usize,
    max_rules: usize,
}

fn policy(category: TemplateCategory) -> CategoryPolicy {
    match category {
        TemplateCategory::Equity => CategoryPolicy {
            required_rules: &["kyc_verification", "trading_hours_restriction"],
            required_metadata: &["market_segment"],
            min_rules: 2,
            max_rules: 20,
        },
        TemplateCategory::FixedIncome => CategoryPolicy {
            required_rules: &["settlement_period_check"],
            required_metadata: &["settlement_days"],
            min_rules: 2,
            max_rules: 20,
        },
        TemplateCategory::PrivateSecurities => CategoryPolicy {
            required_rules: &["accredited_investor_check"],
            required_metadata: &["max_non_accredited", "lockup_days"],
            min_rules: 2,
            max_rules: 15,
        },
        TemplateCategory::Derivatives => CategoryPolicy {
            required_rules: &["options_level_check", "margin_requirement_check"],
            required_metadata: &["margin_requirement"],
            min_rules: 3,
            max_rules: 25,
        },
        TemplateCategory::Hybrid => CategoryPolicy {
            required_rules: &[],
            required_metadata: &[],
            min_rules: 1,
            max_rules: 40,
        },
        TemplateCategory::Commodities => CategoryPolicy {
            required_rules: &["delivery_intent_declaration"],
            required_metadata: &["daily_price_limit"],
            min_rules: 2,
            max_rules: 20,
        },
    }
}

/// Rule-id pairs that must never share a rule set
const INCOMPATIBLE_PAIRS: &[(&str, &str)] = &[
    ("accredited_investor_check", "retail_investor_access"),
    ("margin_requirement_check", "full_settlement_required"),
    ("netting_eligibility", "gross_settlement_only"),
];

/// Rule-id groups that overlap in effect; flagged when all are present
const REDUNDANT_GROUPS: &[&[&str]] = &[
    &["kyc_verification", "enhanced_kyc_verification"],
    &["concentration_limit", "cross_asset_concentration"],
];

/// Compliance-standard substrings expected per category
fn expected_standards(category: TemplateCategory) -> &'static [&'static str] {
    match category {
        TemplateCategory::Equity => &["FINRA", "SEC"],
        TemplateCategory::FixedIncome => &["MSRB", "TRACE"],
        TemplateCategory::PrivateSecurities => &["Reg D", "Rule 144"],
        TemplateCategory::Derivatives => &["CFTC", "EMIR"],
        TemplateCategory::Hybrid => &["MiFID"],
        TemplateCategory::Commodities => &["CFTC"],
    }
}

const BASE_GAS: u64 = 1_000_000;
const GAS_PER_RULE: u64 = 50_000;
const GAS_WARNING_THRESHOLD: u64 = 5_000_000;
const COMPLEXITY_WARNING_THRESHOLD: u32 = 100;
const RULE_COUNT_SUGGESTION_THRESHOLD: usize = 50;

/// Validates complete rule sets before deployment
pub struct RuleSetValidator;

impl RuleSetValidator {
    /// Validate a rule set against the full pipeline.
    ///
    /// `rules` are the definitions resolved for the set's memberships;
    /// memberships whose ids resolve to no known definition are still
    /// counted for sizing and duplicate checks but skipped by the
    /// definition-level checks.
    pub fn validate_rule_set(rule_set: &RuleSet, rules: &[RuleDefinition]) -> ValidationReport {
        let mut errors: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut suggestions: Vec<String> = Vec::new();

        let member_ids: Vec<String> = rule_set.rule_ids();
        let member_id_set: HashSet<&str> = member_ids.iter().map(String::as_str).collect();

        // Structural checks
        if rule_set.name.chars().count() < 3 {
            errors.push("Rule set name must be at least 3 characters".to_string());
        }
        if rule_set.description.chars().count() < 10 {
            errors.push("Rule set description must be at least 10 characters".to_string());
        }
        if member_ids.is_empty() {
            errors.push("Rule set must contain at least one rule".to_string());
        }
        let mut seen: HashSet<&str> = HashSet::new();
        for rule_id in &member_ids {
            if !seen.insert(rule_id.as_str()) {
                errors.push(format!("Duplicate rule id '{}' in rule set", rule_id));
            }
        }

        // Category policy
        let policy = policy(rule_set.category);
        for required in policy.required_rules {
            if !member_id_set.contains(required) {
                warnings.push(format!(
                    "{} rule sets usually include '{}'",
                    rule_set.category, required
                ));
            }
        }
        for field in policy.required_metadata {
            if !rule_set.metadata.contains_key(*field) {
                warnings.push(format!(
                    "{} rule sets usually set metadata field '{}'",
                    rule_set.category, field
                ));
            }
        }
        if !member_ids.is_empty() && member_ids.len() < policy.min_rules {
            warnings.push(format!(
                "{} rule sets usually have at least {} rules",
                rule_set.category, policy.min_rules
            ));
        }
        if member_ids.len() > policy.max_rules {
            errors.push(format!(
                "{} rule sets may contain at most {} rules",
                rule_set.category, policy.max_rules
            ));
        }

        // Category-specific numeric sanity checks
        Self::check_category_thresholds(rule_set, &mut errors, &mut warnings);

        // Compatibility and redundancy
        let distinct_categories: HashSet<_> = rules.iter().map(|rule| rule.category).collect();
        if distinct_categories.len() > 3 {
            warnings.push(format!(
                "Rule set mixes {} rule categories; consider splitting",
                distinct_categories.len()
            ));
        }
        for (left, right) in INCOMPATIBLE_PAIRS {
            if member_id_set.contains(left) && member_id_set.contains(right) {
                errors.push(format!(
                    "Rules '{}' and '{}' are incompatible within one rule set",
                    left, right
                ));
            }
        }
        for group in REDUNDANT_GROUPS {
            if group.iter().all(|id| member_id_set.contains(id)) {
                warnings.push(format!("Rules {:?} are redundant together", group));
            }
        }

        // Dependency presence and cycles (cycles are hard errors here)
        let definitions: HashMap<&str, &RuleDefinition> =
            rules.iter().map(|rule| (rule.id.as_str(), rule)).collect();
        for rule in rules {
            for dependency in &rule.dependencies {
                if !member_id_set.contains(dependency.as_str()) {
                    errors.push(format!(
                        "Rule '{}' depends on '{}' which is not in the rule set",
                        rule.id, dependency
                    ));
                }
            }
        }
        for cycle in DependencyValidator::detect_cycles(&member_ids, |id| {
            definitions
                .get(id)
                .map(|rule| rule.dependencies.clone())
                .unwrap_or_default()
        }) {
            errors.push(format!(
                "Circular dependency detected: {}",
                cycle.join(" -> ")
            ));
        }

        // Regulatory coverage suggestions
        let declared_standards: Vec<String> = rule_set
            .metadata
            .get("compliance_standards")
            .and_then(JsonValue::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(JsonValue::as_str)
                    .map(str::to_lowercase)
                    .collect()
            })
            .unwrap_or_default();
        for expected in expected_standards(rule_set.category) {
            let needle = expected.to_lowercase();
            if !declared_standards.iter().any(|s| s.contains(&needle)) {
                suggestions.push(format!(
                    "Consider declaring {} coverage for {} rule sets",
                    expected, rule_set.category
                ));
            }
        }
        let international = rule_set
            .metadata
            .get("international")
            .map(|value| value != &JsonValue::Bool(false) && !value.is_null())
            .unwrap_or(false);
        if international && !declared_standards.iter().any(|s| s.contains("mifid")) {
            suggestions.push(
                "International rule sets should consider MiFID II coverage".to_string(),
            );
        }

        // Performance and gas heuristics
        let complexity: u32 = rules.iter().map(Self::rule_complexity).sum();
        if complexity > COMPLEXITY_WARNING_THRESHOLD {
            warnings.push(format!(
                "Estimated evaluation complexity {} exceeds {}",
                complexity, COMPLEXITY_WARNING_THRESHOLD
            ));
        }
        if member_ids.len() > RULE_COUNT_SUGGESTION_THRESHOLD {
            suggestions.push(format!(
                "Rule set has {} rules; consider splitting into smaller sets",
                member_ids.len()
            ));
        }
        let estimated_gas = BASE_GAS + GAS_PER_RULE * member_ids.len() as u64;
        if estimated_gas > GAS_WARNING_THRESHOLD {
            warnings.push(format!(
                "Estimated deployment gas {} exceeds {}",
                estimated_gas, GAS_WARNING_THRESHOLD
            ));
        }

        let score = Self::score(errors.len(), warnings.len(), suggestions.len());
        debug!(
            rule_set_id = %rule_set.id,
            errors = errors.len(),
            warnings = warnings.len(),
            suggestions = suggestions.len(),
            score,
            "validated rule set"
        );

        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
            suggestions,
            score,
        }
    }

    /// Structural validation of a single rule: id and name must be
    /// non-empty (condition and action presence is enforced by the type).
    pub fn validate_single_rule(rule: &RuleDefinition) -> SingleRuleReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if rule.id.trim().is_empty() {
            errors.push("Rule id must not be empty".to_string());
        }
        if rule.name.trim().is_empty() {
            errors.push("Rule name must not be empty".to_string());
        }
        if rule.dependencies.iter().any(|dep| dep == &rule.id) {
            warnings.push(format!("Rule '{}' depends on itself", rule.id));
        }

        SingleRuleReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    fn check_category_thresholds(
        rule_set: &RuleSet,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        let metadata_f64 =
            |key: &str| -> Option<f64> { rule_set.metadata.get(key).and_then(JsonValue::as_f64) };

        match rule_set.category {
            TemplateCategory::Equity => {
                if let Some(balance) = metadata_f64("pdt_minimum_balance") {
                    if balance < 25_000.0 {
                        warnings.push(format!(
                            "Pattern day trader minimum balance {} is below the FINRA 25000 floor",
                            balance
                        ));
                    }
                }
            }
            TemplateCategory::FixedIncome => {
                if let Some(days) = metadata_f64("settlement_days") {
                    if days > 3.0 {
                        warnings.push(format!(
                            "Settlement period T+{} exceeds the T+3 convention",
                            days
                        ));
                    }
                }
            }
            TemplateCategory::PrivateSecurities => {
                if let Some(cap) = metadata_f64("max_non_accredited") {
                    if cap > 35.0 {
                        errors.push(format!(
                            "Reg D 506(b) permits at most 35 non-accredited investors, configured {}",
                            cap
                        ));
                    }
                }
                if let Some(lockup) = metadata_f64("lockup_days") {
                    if lockup < 180.0 {
                        warnings.push(format!(
                            "Lockup period of {} days is below the customary 180-day minimum",
                            lockup
                        ));
                    }
                }
            }
            TemplateCategory::Derivatives => {
                if let Some(margin) = metadata_f64("margin_requirement") {
                    if margin < 0.15 {
                        warnings.push(format!(
                            "Margin requirement {} is below the 0.15 prudential floor",
                            margin
                        ));
                    }
                }
            }
            TemplateCategory::Hybrid | TemplateCategory::Commodities => {}
        }
    }

    fn rule_complexity(rule: &RuleDefinition) -> u32 {
        let mut complexity = 1u32;
        match &rule.condition {
            Condition::ComplexCalculation { .. } => complexity += 3,
            Condition::ExternalApiCall { .. } => complexity += 5,
            _ => {}
        }
        if rule.action.is_list() {
            complexity += rule.action.len() as u32;
        }
        complexity
    }

    /// Score starts at 100, loses 15 per error and 5 per warning, gains
    /// 2 per suggestion capped at +10, clamped to [0, 100].
    fn score(errors: usize, warnings: usize, suggestions: usize) -> u8 {
        let bonus = (suggestions as i64 * 2).min(10);
        let raw = 100 - 15 * errors as i64 - 5 * warnings as i64 + bonus;
        raw.clamp(0, 100) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TemplateCatalog;
    use crate::model::{RuleSetMembership, RuleSetStatus, TargetChain};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn rule_set_with(
        category: TemplateCategory,
        rule_ids: &[&str],
        metadata: serde_json::Value,
    ) -> RuleSet {
        let id = Uuid::new_v4();
        let memberships = rule_ids
            .iter()
            .enumerate()
            .map(|(index, rule_id)| RuleSetMembership {
                id: Uuid::new_v4(),
                rule_set_id: id,
                rule_id: rule_id.to_string(),
                order_index: index as u32,
                required: true,
                enabled: true,
                added_by: "tester".to_string(),
                added_at: Utc::now(),
            })
            .collect();
        RuleSet {
            id,
            name: "Desk Controls".to_string(),
            description: "Controls for the integration test desk".to_string(),
            category,
            instrument_type: None,
            template_id: None,
            created_by: "tester".to_string(),
            status: RuleSetStatus::Draft,
            metadata: metadata.as_object().cloned().unwrap_or_default(),
            chain: TargetChain::Evm,
            memberships,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            contract_address: None,
            transaction_hash: None,
            deployed_at: None,
        }
    }

    fn resolve(catalog: &TemplateCatalog, rule_set: &RuleSet) -> Vec<RuleDefinition> {
        rule_set
            .rule_ids()
            .iter()
            .filter_map(|id| catalog.rule_definition(id).cloned())
            .collect()
    }

    #[test]
    fn clean_rule_set_scores_one_hundred_despite_suggestions() {
        let catalog = TemplateCatalog::new();
        // Equity set satisfying policy and thresholds, but declaring no
        // compliance standards: both expected-standard suggestions fire.
        let rule_set = rule_set_with(
            TemplateCategory::Equity,
            &[
                "kyc_verification",
                "trading_hours_restriction",
                "pattern_day_trader_check",
            ],
            json!({
                "market_segment": "listed",
                "pdt_minimum_balance": 25000
            }),
        );
        let rules = resolve(&catalog, &rule_set);
        let report = RuleSetValidator::validate_rule_set(&rule_set, &rules);

        assert!(report.valid, "unexpected errors: {:?}", report.errors);
        assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
        assert!(!report.suggestions.is_empty());
        // Suggestions only ever clamp to 100, never push beyond it
        assert_eq!(report.score, 100);
    }

    #[test]
    fn reg_d_cap_above_thirty_five_is_a_hard_error() {
        let catalog = TemplateCatalog::new();
        let rule_set = rule_set_with(
            TemplateCategory::PrivateSecurities,
            &[
                "kyc_verification",
                "accredited_investor_check",
                "non_accredited_cap",
            ],
            json!({
                "max_non_accredited": 40,
                "lockup_days": 365
            }),
        );
        let rules = resolve(&catalog, &rule_set);
        let report = RuleSetValidator::validate_rule_set(&rule_set, &rules);

        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("35")));
    }

    #[test]
    fn missing_declared_dependency_is_a_hard_error() {
        let catalog = TemplateCatalog::new();
        // pattern_day_trader_check declares a dependency on
        // kyc_verification, which is absent here.
        let rule_set = rule_set_with(
            TemplateCategory::Equity,
            &["trading_hours_restriction", "pattern_day_trader_check"],
            json!({ "market_segment": "listed" }),
        );
        let rules = resolve(&catalog, &rule_set);
        let report = RuleSetValidator::validate_rule_set(&rule_set, &rules);

        assert!(!report.valid);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("kyc_verification")));
    }

    #[test]
    fn circular_dependencies_are_hard_errors_here() {
        let rule_set = rule_set_with(
            TemplateCategory::Hybrid,
            &["rule_a", "rule_b"],
            json!({}),
        );
        let rules = vec![
            RuleDefinition {
                id: "rule_a".to_string(),
                name: "Rule A".to_string(),
                category: crate::model::RuleCategory::Compliance,
                condition: Condition::InvestorStatus {
                    operator: crate::model::ConditionOperator::Equals,
                    value: "VERIFIED".to_string(),
                },
                action: crate::model::ActionSpec::One(crate::model::Action::Warn {
                    message: "a".to_string(),
                }),
                priority: 1,
                dependencies: vec!["rule_b".to_string()],
                conflicts: vec![],
            },
            RuleDefinition {
                id: "rule_b".to_string(),
                name: "Rule B".to_string(),
                category: crate::model::RuleCategory::Compliance,
                condition: Condition::InvestorStatus {
                    operator: crate::model::ConditionOperator::Equals,
                    value: "VERIFIED".to_string(),
                },
                action: crate::model::ActionSpec::One(crate::model::Action::Warn {
                    message: "b".to_string(),
                }),
                priority: 2,
                dependencies: vec!["rule_a".to_string()],
                conflicts: vec![],
            },
        ];
        let report = RuleSetValidator::validate_rule_set(&rule_set, &rules);

        assert!(!report.valid);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("Circular dependency")));
    }

    #[test]
    fn incompatible_pair_is_a_hard_error() {
        let catalog = TemplateCatalog::new();
        let rule_set = rule_set_with(
            TemplateCategory::PrivateSecurities,
            &[
                "kyc_verification",
                "accredited_investor_check",
                "retail_investor_access",
            ],
            json!({ "max_non_accredited": 35, "lockup_days": 365 }),
        );
        let rules = resolve(&catalog, &rule_set);
        let report = RuleSetValidator::validate_rule_set(&rule_set, &rules);

        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("incompatible")));
    }

    #[test]
    fn empty_rule_set_fails_structurally() {
        let rule_set = rule_set_with(TemplateCategory::Hybrid, &[], json!({}));
        let report = RuleSetValidator::validate_rule_set(&rule_set, &[]);

        assert!(!report.valid);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("at least one rule")));
    }

    #[test]
    fn duplicate_rule_ids_are_errors_not_silently_deduplicated() {
        let catalog = TemplateCatalog::new();
        let rule_set = rule_set_with(
            TemplateCategory::Hybrid,
            &["kyc_verification", "kyc_verification"],
            json!({}),
        );
        let rules = resolve(&catalog, &rule_set);
        let report = RuleSetValidator::validate_rule_set(&rule_set, &rules);

        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("Duplicate")));
    }

    #[test]
    fn max_rule_count_is_a_hard_error() {
        let ids: Vec<String> = (0..41).map(|i| format!("rule_{}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let rule_set = rule_set_with(TemplateCategory::Hybrid, &id_refs, json!({}));
        let report = RuleSetValidator::validate_rule_set(&rule_set, &[]);

        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("at most 40")));
    }

    #[test]
    fn score_floor_is_zero() {
        assert_eq!(RuleSetValidator::score(10, 10, 0), 0);
        assert_eq!(RuleSetValidator::score(0, 0, 0), 100);
        assert_eq!(RuleSetValidator::score(0, 1, 0), 95);
        assert_eq!(RuleSetValidator::score(1, 0, 0), 85);
        // Suggestion bonus caps at +10 and clamps at 100
        assert_eq!(RuleSetValidator::score(0, 0, 8), 100);
        assert_eq!(RuleSetValidator::score(1, 0, 8), 95);
    }

    #[test]
    fn single_rule_structural_checks() {
        let catalog = TemplateCatalog::new();
        let rule = catalog.rule_definition("kyc_verification").unwrap();
        let report = RuleSetValidator::validate_single_rule(rule);
        assert!(report.valid);

        let mut broken = rule.clone();
        broken.id = " ".to_string();
        broken.name = String::new();
        let report = RuleSetValidator::validate_single_rule(&broken);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2);
    }
}
