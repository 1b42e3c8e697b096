//! Rule dependency and conflict validation
//!
//! Rules declare `requires` and `conflicts` relationships against other
//! rule ids. This module holds the static relationship tables keyed by
//! rule id (distinct from the per-rule `dependencies` field carried on
//! `RuleDefinition`, which the full validator checks separately) and the
//! depth-first cycle detection shared by both validation paths.
//!
//! Severity is the caller's decision: the service-level dependency check
//! reports cycles as warnings, while the full rule set validator treats
//! them as hard errors.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Static `requires` edges keyed by rule id.
///
/// A rule listed here may only appear in a rule set alongside every rule
/// id it requires.
pub fn rule_requirements(rule_id: &str) -> &'static [&'static str] {
    match rule_id {
        "pattern_day_trader_check" => &["kyc_verification"],
        "accredited_investor_check" => &["kyc_verification"],
        "enhanced_kyc_verification" => &["kyc_verification"],
        "non_accredited_cap" => &["accredited_investor_check"],
        "lockup_period_enforcement" => &["accredited_investor_check"],
        "margin_requirement_check" => &["options_level_check"],
        "portfolio_stress_test" => &["var_limit_check", "margin_requirement_check"],
        _ => &[],
    }
}

/// Static `conflicts` edges keyed by rule id. Declared symmetrically.
pub fn rule_conflicts(rule_id: &str) -> &'static [&'static str] {
    match rule_id {
        "accredited_investor_check" => &["retail_investor_access"],
        "retail_investor_access" => &["accredited_investor_check"],
        "margin_requirement_check" => &["full_settlement_required"],
        "full_settlement_required" => &["margin_requirement_check"],
        "netting_eligibility" => &["gross_settlement_only"],
        "gross_settlement_only" => &["netting_eligibility"],
        _ => &[],
    }
}

/// A required dependency absent from the rule id set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingDependency {
    pub rule_id: String,
    pub requires: String,
}

/// A declared conflict present in the rule id set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub rule_id: String,
    pub conflicts_with: String,
}

/// Result of dependency validation over a set of rule ids.
///
/// Missing dependencies and conflicts flip `valid` to false; circular
/// dependencies and duplicate ids are reported as warnings only at this
/// level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    pub valid: bool,
    pub conflicts: Vec<ConflictEntry>,
    pub missing_dependencies: Vec<MissingDependency>,
    pub warnings: Vec<String>,
}

/// Validates dependency and conflict declarations over rule id sets
pub struct DependencyValidator;

impl DependencyValidator {
    /// Validate a set of rule ids against the static relationship tables.
    pub fn validate(rule_ids: &[String]) -> DependencyReport {
        Self::validate_with_edges(rule_ids, |id| {
            rule_requirements(id)
                .iter()
                .map(|dep| dep.to_string())
                .collect()
        })
    }

    /// Validate with an injected `requires` edge function instead of the
    /// static table. Conflicts always come from the static table. This is
    /// the seam that lets cyclic requirement graphs be exercised; at this
    /// level a cycle is a warning, never an error.
    pub fn validate_with_edges<F>(rule_ids: &[String], requires: F) -> DependencyReport
    where
        F: Fn(&str) -> Vec<String>,
    {
        let id_set: HashSet<&str> = rule_ids.iter().map(String::as_str).collect();
        let mut missing_dependencies = Vec::new();
        let mut conflicts = Vec::new();
        let mut warnings = Vec::new();

        let mut seen: HashSet<&str> = HashSet::new();
        for rule_id in rule_ids {
            if !seen.insert(rule_id.as_str()) {
                warnings.push(format!("Duplicate rule id '{}' supplied", rule_id));
            }
        }

        for rule_id in &id_set {
            for required in requires(rule_id) {
                if !id_set.contains(required.as_str()) {
                    missing_dependencies.push(MissingDependency {
                        rule_id: rule_id.to_string(),
                        requires: required,
                    });
                }
            }
            for conflict in rule_conflicts(rule_id) {
                if id_set.contains(conflict) {
                    conflicts.push(ConflictEntry {
                        rule_id: rule_id.to_string(),
                        conflicts_with: conflict.to_string(),
                    });
                }
            }
        }

        for cycle in Self::detect_cycles(rule_ids, &requires) {
            warnings.push(format!(
                "Circular dependency detected: {}",
                cycle.join(" -> ")
            ));
        }

        DependencyReport {
            valid: missing_dependencies.is_empty() && conflicts.is_empty(),
            conflicts,
            missing_dependencies,
            warnings,
        }
    }

    /// Detect circular dependencies among the supplied rule ids.
    ///
    /// Depth-first traversal from each unvisited id with a recursion-stack
    /// set; a cycle is recorded when traversal reaches a node currently on
    /// the stack, as the path slice from that node's first occurrence to
    /// the current point. Only edges whose target is inside the supplied
    /// id set are followed, and only `requires` edges (never conflicts).
    /// All disjoint cycles are reported, not just the first.
    pub fn detect_cycles<F>(rule_ids: &[String], edges: F) -> Vec<Vec<String>>
    where
        F: Fn(&str) -> Vec<String>,
    {
        let id_set: HashSet<&str> = rule_ids.iter().map(String::as_str).collect();
        let mut visited: HashSet<String> = HashSet::new();
        let mut cycles = Vec::new();

        for start in rule_ids {
            if visited.contains(start.as_str()) {
                continue;
            }
            let mut path: Vec<String> = Vec::new();
            let mut on_stack: HashSet<String> = HashSet::new();
            Self::dfs(
                start, &id_set, &edges, &mut visited, &mut path, &mut on_stack, &mut cycles,
            );
        }

        cycles
    }

    fn dfs<F>(
        node: &str,
        id_set: &HashSet<&str>,
        edges: &F,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
        on_stack: &mut HashSet<String>,
        cycles: &mut Vec<Vec<String>>,
    ) where
        F: Fn(&str) -> Vec<String>,
    {
        if on_stack.contains(node) {
            if let Some(start) = path.iter().position(|entry| entry == node) {
                cycles.push(path[start..].to_vec());
            }
            return;
        }
        if visited.contains(node) {
            return;
        }

        visited.insert(node.to_string());
        on_stack.insert(node.to_string());
        path.push(node.to_string());

        for dependency in edges(node) {
            if id_set.contains(dependency.as_str()) {
                Self::dfs(&dependency, id_set, edges, visited, path, on_stack, cycles);
            }
        }

        path.pop();
        on_stack.remove(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn acyclic_set_produces_no_cycles() {
        let rule_ids = ids(&[
            "kyc_verification",
            "pattern_day_trader_check",
            "trading_hours_restriction",
        ]);
        let cycles = DependencyValidator::detect_cycles(&rule_ids, |id| {
            rule_requirements(id)
                .iter()
                .map(|dep| dep.to_string())
                .collect()
        });
        assert!(cycles.is_empty());
    }

    #[test]
    fn artificial_two_node_cycle_is_reported_once() {
        let rule_ids = ids(&["rule_a", "rule_b"]);
        let cycles = DependencyValidator::detect_cycles(&rule_ids, |id| match id {
            "rule_a" => vec!["rule_b".to_string()],
            "rule_b" => vec!["rule_a".to_string()],
            _ => vec![],
        });
        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].contains(&"rule_a".to_string()));
        assert!(cycles[0].contains(&"rule_b".to_string()));
    }

    #[test]
    fn disjoint_cycles_are_all_reported() {
        let rule_ids = ids(&["a", "b", "c", "d"]);
        let cycles = DependencyValidator::detect_cycles(&rule_ids, |id| match id {
            "a" => vec!["b".to_string()],
            "b" => vec!["a".to_string()],
            "c" => vec!["d".to_string()],
            "d" => vec!["c".to_string()],
            _ => vec![],
        });
        assert_eq!(cycles.len(), 2);
    }

    #[test]
    fn edges_outside_the_supplied_set_are_not_followed() {
        // margin_requirement_check requires options_level_check, but the
        // requirement target is outside the set so traversal stops there.
        let rule_ids = ids(&["margin_requirement_check"]);
        let cycles = DependencyValidator::detect_cycles(&rule_ids, |id| {
            rule_requirements(id)
                .iter()
                .map(|dep| dep.to_string())
                .collect()
        });
        assert!(cycles.is_empty());
    }

    #[test]
    fn missing_required_dependency_fails_validation() {
        let report = DependencyValidator::validate(&ids(&["accredited_investor_check"]));
        assert!(!report.valid);
        assert_eq!(report.missing_dependencies.len(), 1);
        assert_eq!(report.missing_dependencies[0].requires, "kyc_verification");
    }

    #[test]
    fn declared_conflict_fails_validation() {
        let report = DependencyValidator::validate(&ids(&[
            "kyc_verification",
            "accredited_investor_check",
            "retail_investor_access",
        ]));
        assert!(!report.valid);
        assert!(report
            .conflicts
            .iter()
            .any(|c| c.conflicts_with == "retail_investor_access"
                || c.conflicts_with == "accredited_investor_check"));
    }

    #[test]
    fn duplicates_are_flagged_as_warnings_not_deduplicated_silently() {
        let report =
            DependencyValidator::validate(&ids(&["kyc_verification", "kyc_verification"]));
        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.contains("Duplicate")));
    }

    #[test]
    fn cyclic_requirements_warn_but_stay_valid() {
        let rule_ids = ids(&["rule_a", "rule_b"]);
        let report = DependencyValidator::validate_with_edges(&rule_ids, |id| match id {
            "rule_a" => vec!["rule_b".to_string()],
            "rule_b" => vec!["rule_a".to_string()],
            _ => vec![],
        });

        assert!(report.valid, "cycles alone must not fail this check");
        assert!(report.missing_dependencies.is_empty());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("Circular dependency")));
    }

    #[test]
    fn satisfied_dependencies_pass() {
        let report = DependencyValidator::validate(&ids(&[
            "kyc_verification",
            "accredited_investor_check",
            "non_accredited_cap",
        ]));
        assert!(report.valid, "unexpected report: {:?}", report);
        assert!(report.missing_dependencies.is_empty());
        assert!(report.conflicts.is_empty());
    }
}
