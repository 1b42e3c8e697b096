//! Data model for capital-markets rule templates and rule sets
//!
//! Templates are immutable bundles of rule definitions seeded at process
//! start. Rule sets are user-composed collections of rule memberships that
//! move through a one-way status lifecycle (draft -> deploying -> deployed
//! or failed) and are eventually published to an external chain-backed
//! rule engine.
//!
//! Conditions and actions are polymorphic in the upstream wire format
//! (the payload shape varies with the `type` discriminant), so both are
//! modelled as serde tagged unions with one variant per observed type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

// ============================================================================
// Categories and enums
// ============================================================================

/// Asset-class category of a template or rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateCategory {
    Equity,
    FixedIncome,
    PrivateSecurities,
    Derivatives,
    Hybrid,
    Commodities,
}

impl std::fmt::Display for TemplateCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateCategory::Equity => write!(f, "EQUITY"),
            TemplateCategory::FixedIncome => write!(f, "FIXED_INCOME"),
            TemplateCategory::PrivateSecurities => write!(f, "PRIVATE_SECURITIES"),
            TemplateCategory::Derivatives => write!(f, "DERIVATIVES"),
            TemplateCategory::Hybrid => write!(f, "HYBRID"),
            TemplateCategory::Commodities => write!(f, "COMMODITIES"),
        }
    }
}

/// Functional category tag on an individual rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleCategory {
    Compliance,
    Transaction,
    Wallet,
    Security,
    Token,
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleCategory::Compliance => write!(f, "COMPLIANCE"),
            RuleCategory::Transaction => write!(f, "TRANSACTION"),
            RuleCategory::Wallet => write!(f, "WALLET"),
            RuleCategory::Security => write!(f, "SECURITY"),
            RuleCategory::Token => write!(f, "TOKEN"),
        }
    }
}

/// Rule set deployment lifecycle status.
///
/// Transitions are one-way: `Draft -> Deploying -> {Deployed, Failed}`.
/// There is no edge back to `Draft` from any other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSetStatus {
    Draft,
    Deploying,
    Deployed,
    Failed,
}

impl std::fmt::Display for RuleSetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleSetStatus::Draft => write!(f, "draft"),
            RuleSetStatus::Deploying => write!(f, "deploying"),
            RuleSetStatus::Deployed => write!(f, "deployed"),
            RuleSetStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Target chain for deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetChain {
    Evm,
    Solana,
}

impl std::fmt::Display for TargetChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetChain::Evm => write!(f, "evm"),
            TargetChain::Solana => write!(f, "solana"),
        }
    }
}

// ============================================================================
// Conditions and actions
// ============================================================================

/// Comparison operator applied by a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Between,
    In,
    NotIn,
}

/// Condition evaluated against a live transaction (evaluation itself is
/// out of scope here; the engine consumes these definitions downstream).
///
/// The value payload varies with the condition type: scalar thresholds,
/// range pairs, enumerated sets, or structured calculation inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    InvestorStatus {
        operator: ConditionOperator,
        value: String,
    },
    TimeRange {
        operator: ConditionOperator,
        start: String,
        end: String,
    },
    AccountBalance {
        operator: ConditionOperator,
        value: f64,
    },
    MarginRatio {
        operator: ConditionOperator,
        value: f64,
    },
    PriceMovement {
        operator: ConditionOperator,
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window_minutes: Option<u32>,
    },
    TradeSize {
        operator: ConditionOperator,
        value: f64,
    },
    SettlementDate {
        operator: ConditionOperator,
        /// Days relative to trade date (T+n)
        value: u32,
    },
    BondType {
        operator: ConditionOperator,
        value: Vec<String>,
    },
    PositionSize {
        operator: ConditionOperator,
        value: f64,
    },
    OptionsLevel {
        operator: ConditionOperator,
        value: u8,
    },
    Concentration {
        operator: ConditionOperator,
        value: f64,
    },
    VarLimit {
        operator: ConditionOperator,
        value: f64,
    },
    NettingEligible {
        operator: ConditionOperator,
        value: bool,
    },
    CapitalRatio {
        operator: ConditionOperator,
        value: f64,
    },
    #[serde(rename = "LCR")]
    Lcr {
        operator: ConditionOperator,
        value: f64,
    },
    DeliveryIntent {
        operator: ConditionOperator,
        value: Vec<String>,
    },
    ComplexCalculation {
        operator: ConditionOperator,
        formula: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        inputs: Vec<String>,
    },
    ExternalApiCall {
        operator: ConditionOperator,
        endpoint: String,
        value: JsonValue,
    },
}

/// Action taken when a rule's condition matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Block {
        message: String,
    },
    Warn {
        message: String,
    },
    RequireApproval {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        approver_role: Option<String>,
    },
    Restrict {
        message: String,
        restrictions: Vec<String>,
    },
    CalculateMargin {
        message: String,
        formula: String,
    },
    Notify {
        message: String,
        system: String,
    },
    DelaySettlement {
        message: String,
        timeframe: String,
    },
    LimitPosition {
        message: String,
        max_exposure: f64,
    },
}

/// One action or an ordered list of actions.
///
/// The upstream format allows either shape; list length feeds the
/// complexity heuristic in the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionSpec {
    One(Action),
    Many(Vec<Action>),
}

impl ActionSpec {
    pub fn is_list(&self) -> bool {
        matches!(self, ActionSpec::Many(_))
    }

    pub fn len(&self) -> usize {
        match self {
            ActionSpec::One(_) => 1,
            ActionSpec::Many(actions) => actions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Rules and templates
// ============================================================================

/// An atomic compliance/transaction rule: a condition-action pair plus
/// declared relationships to other rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    pub name: String,
    pub category: RuleCategory,
    pub condition: Condition,
    pub action: ActionSpec,
    /// Metadata only; not evaluated by this subsystem
    pub priority: u32,
    /// Rule ids that must be present in the same rule set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Rule ids that must NOT be present in the same rule set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
}

/// A named, versioned bundle of rules representing a common regulatory
/// trading scenario. Seeded at startup, read-only thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: TemplateCategory,
    pub version: String,
    pub rules: Vec<RuleDefinition>,
    pub configuration: Map<String, JsonValue>,
    pub compliance_standards: Vec<String>,
}

/// Partial rule override applied during template customization.
/// Present fields win over the template rule; absent fields pass through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<RuleCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<String>>,
}

impl RuleOverride {
    /// Shallow-merge this override over a rule: present fields win.
    pub fn apply(&self, rule: &mut RuleDefinition) {
        if let Some(name) = &self.name {
            rule.name = name.clone();
        }
        if let Some(category) = self.category {
            rule.category = category;
        }
        if let Some(condition) = &self.condition {
            rule.condition = condition.clone();
        }
        if let Some(action) = &self.action {
            rule.action = action.clone();
        }
        if let Some(priority) = self.priority {
            rule.priority = priority;
        }
        if let Some(dependencies) = &self.dependencies {
            rule.dependencies = dependencies.clone();
        }
        if let Some(conflicts) = &self.conflicts {
            rule.conflicts = conflicts.clone();
        }
    }
}

/// Caller-supplied customization for template application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateCustomization {
    /// Merged over the template configuration, customization wins per key
    #[serde(default)]
    pub configuration: Map<String, JsonValue>,
    /// Partial overrides keyed by template rule id
    #[serde(default)]
    pub rule_overrides: std::collections::HashMap<String, RuleOverride>,
}

/// A rule instantiated from a template, carrying a fresh deployment id
/// so that composed rule sets can reference multiple instantiations of
/// the same template rule without collision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployableRule {
    pub deployment_id: Uuid,
    #[serde(flatten)]
    pub definition: RuleDefinition,
}

/// Result of applying a template: a deep clone of the template with
/// customization merged in and fresh deployment ids on every rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedTemplate {
    pub template_id: String,
    pub name: String,
    pub description: String,
    pub category: TemplateCategory,
    pub version: String,
    pub rules: Vec<DeployableRule>,
    pub configuration: Map<String, JsonValue>,
    pub compliance_standards: Vec<String>,
}

// ============================================================================
// Rule sets
// ============================================================================

/// Membership of one rule in a rule set.
///
/// `order_index` is assigned as `current membership count + position in
/// batch` at append time and is never renumbered or reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetMembership {
    pub id: Uuid,
    pub rule_set_id: Uuid,
    pub rule_id: String,
    pub order_index: u32,
    pub required: bool,
    pub enabled: bool,
    pub added_by: String,
    pub added_at: DateTime<Utc>,
}

/// A user-composed, named collection of rule memberships, deployable to
/// a target chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: TemplateCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_type: Option<String>,
    /// Source template, when this set was created via template application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub created_by: String,
    pub status: RuleSetStatus,
    pub metadata: Map<String, JsonValue>,
    pub chain: TargetChain,
    pub memberships: Vec<RuleSetMembership>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<DateTime<Utc>>,
}

impl RuleSet {
    /// Rule ids in membership order
    pub fn rule_ids(&self) -> Vec<String> {
        self.memberships.iter().map(|m| m.rule_id.clone()).collect()
    }
}

/// Append-only record of one successful deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: Uuid,
    pub rule_set_id: Uuid,
    pub contract_address: String,
    pub transaction_hash: String,
    pub deployed_at: DateTime<Utc>,
}

// ============================================================================
// Service input types
// ============================================================================

/// Fields for creating a rule set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRuleSetFields {
    pub name: String,
    pub description: String,
    /// Defaults to HYBRID when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<TemplateCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Defaults to evm when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<TargetChain>,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
    /// When non-empty, rules are appended immediately after creation
    #[serde(default)]
    pub rule_ids: Vec<String>,
}

/// Filters for listing rule sets; all supplied filters are AND-combined
#[derive(Debug, Clone, Default)]
pub struct RuleSetFilter {
    pub category: Option<TemplateCategory>,
    pub status: Option<RuleSetStatus>,
    pub created_by: Option<String>,
}

/// Filters for listing templates
#[derive(Debug, Clone, Default)]
pub struct TemplateFilter {
    pub category: Option<TemplateCategory>,
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_serializes_with_type_discriminant() {
        let condition = Condition::AccountBalance {
            operator: ConditionOperator::GreaterThanOrEqual,
            value: 25000.0,
        };
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(json["type"], "ACCOUNT_BALANCE");
        assert_eq!(json["operator"], "GREATER_THAN_OR_EQUAL");
        assert_eq!(json["value"], 25000.0);
    }

    #[test]
    fn lcr_condition_uses_upstream_tag() {
        let condition = Condition::Lcr {
            operator: ConditionOperator::GreaterThanOrEqual,
            value: 1.0,
        };
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(json["type"], "LCR");
    }

    #[test]
    fn action_spec_accepts_single_or_list() {
        let single: ActionSpec = serde_json::from_value(serde_json::json!({
            "type": "BLOCK",
            "message": "blocked"
        }))
        .unwrap();
        assert!(!single.is_list());
        assert_eq!(single.len(), 1);

        let many: ActionSpec = serde_json::from_value(serde_json::json!([
            { "type": "WARN", "message": "first" },
            { "type": "NOTIFY", "message": "second", "system": "surveillance" }
        ]))
        .unwrap();
        assert!(many.is_list());
        assert_eq!(many.len(), 2);
    }

    #[test]
    fn rule_override_merges_present_fields_only() {
        let mut rule = RuleDefinition {
            id: "kyc_verification".to_string(),
            name: "KYC Verification".to_string(),
            category: RuleCategory::Compliance,
            condition: Condition::InvestorStatus {
                operator: ConditionOperator::Equals,
                value: "VERIFIED".to_string(),
            },
            action: ActionSpec::One(Action::Block {
                message: "KYC required".to_string(),
            }),
            priority: 10,
            dependencies: vec![],
            conflicts: vec![],
        };

        let override_spec = RuleOverride {
            priority: Some(1),
            ..Default::default()
        };
        override_spec.apply(&mut rule);

        assert_eq!(rule.priority, 1);
        assert_eq!(rule.name, "KYC Verification");
        assert_eq!(rule.category, RuleCategory::Compliance);
    }

    #[test]
    fn status_round_trips_as_lowercase() {
        let json = serde_json::to_value(RuleSetStatus::Deploying).unwrap();
        assert_eq!(json, "deploying");
        let status: RuleSetStatus = serde_json::from_value(json).unwrap();
        assert_eq!(status, RuleSetStatus::Deploying);
    }
}
