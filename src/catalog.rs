//! Capital-markets rule template catalog
//!
//! Holds the fixed set of named rule templates seeded at process start:
//! equity trading, fixed income, private securities (Reg D), derivatives,
//! hybrid multi-asset, and commodities. Templates are immutable; applying
//! one always deep-clones before customization so no caller ever shares
//! mutable state with the catalog.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, RuleError};
use crate::model::{
    Action, ActionSpec, AppliedTemplate, Condition, ConditionOperator, DeployableRule,
    RuleCategory, RuleDefinition, RuleTemplate, TargetChain, TemplateCategory,
    TemplateCustomization, TemplateFilter,
};

/// Result of a chain compatibility check.
///
/// Never raised as an error: an unknown template id yields `valid: false`
/// with an explanatory message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainCompatibility {
    pub valid: bool,
    pub message: String,
    /// Allowed categories for the chain when incompatible; empty otherwise
    pub recommendations: Vec<TemplateCategory>,
}

/// Caller requirements for template recommendations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_class: Option<TemplateCategory>,
    #[serde(default)]
    pub compliance_standards: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_investment: Option<f64>,
}

/// A scored template recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRecommendation {
    pub template: RuleTemplate,
    pub score: u32,
    pub reasoning: String,
}

/// Categories deployable on a given chain
pub fn allowed_categories(chain: TargetChain) -> &'static [TemplateCategory] {
    match chain {
        TargetChain::Evm => &[
            TemplateCategory::Equity,
            TemplateCategory::FixedIncome,
            TemplateCategory::PrivateSecurities,
            TemplateCategory::Hybrid,
        ],
        TargetChain::Solana => &[
            TemplateCategory::Equity,
            TemplateCategory::Derivatives,
            TemplateCategory::Hybrid,
        ],
    }
}

/// Catalog of seeded rule templates
pub struct TemplateCatalog {
    templates: Vec<RuleTemplate>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateCatalog {
    /// Seed the catalog with the built-in templates. Insertion order is
    /// the listing order.
    pub fn new() -> Self {
        Self {
            templates: vec![
                equity_trading_basic(),
                fixed_income_basic(),
                private_securities_reg_d(),
                derivatives_advanced(),
                hybrid_multi_asset(),
                commodities_trading(),
            ],
        }
    }

    /// Pure lookup by template id
    pub fn get_template(&self, id: &str) -> Result<&RuleTemplate> {
        self.templates
            .iter()
            .find(|template| template.id == id)
            .ok_or_else(|| RuleError::TemplateNotFound(id.to_string()))
    }

    /// List templates, applying zero or more equality filters in catalog
    /// insertion order.
    pub fn list_templates(&self, filter: &TemplateFilter) -> Vec<&RuleTemplate> {
        self.templates
            .iter()
            .filter(|template| {
                filter
                    .category
                    .map_or(true, |category| template.category == category)
            })
            .filter(|template| {
                filter
                    .version
                    .as_ref()
                    .map_or(true, |version| &template.version == version)
            })
            .collect()
    }

    /// Look up a rule definition by rule id across all templates, in
    /// catalog order. Used to resolve rule set memberships back to
    /// definitions at the deployment gate.
    pub fn rule_definition(&self, rule_id: &str) -> Option<&RuleDefinition> {
        self.templates
            .iter()
            .flat_map(|template| template.rules.iter())
            .find(|rule| rule.id == rule_id)
    }

    /// Apply a template: deep-clone, merge customization, and assign a
    /// fresh deployment id to every rule (overridden or not).
    pub fn apply_template(
        &self,
        id: &str,
        customization: &TemplateCustomization,
    ) -> Result<AppliedTemplate> {
        let template = self.get_template(id)?;

        let mut configuration = template.configuration.clone();
        for (key, value) in &customization.configuration {
            configuration.insert(key.clone(), value.clone());
        }

        let rules = template
            .rules
            .iter()
            .map(|rule| {
                let mut definition = rule.clone();
                if let Some(override_spec) = customization.rule_overrides.get(&rule.id) {
                    override_spec.apply(&mut definition);
                }
                DeployableRule {
                    deployment_id: Uuid::new_v4(),
                    definition,
                }
            })
            .collect::<Vec<_>>();

        info!(
            template_id = %template.id,
            rules = rules.len(),
            overrides = customization.rule_overrides.len(),
            "applied rule template"
        );

        Ok(AppliedTemplate {
            template_id: template.id.clone(),
            name: template.name.clone(),
            description: template.description.clone(),
            category: template.category,
            version: template.version.clone(),
            rules,
            configuration,
            compliance_standards: template.compliance_standards.clone(),
        })
    }

    /// Check whether a template's category is deployable on a chain.
    ///
    /// Fails gracefully on an unknown template id rather than erroring.
    pub fn validate_chain_compatibility(&self, id: &str, chain: TargetChain) -> ChainCompatibility {
        let template = match self.get_template(id) {
            Ok(template) => template,
            Err(_) => {
                warn!(template_id = id, "chain compatibility check on unknown template");
                return ChainCompatibility {
                    valid: false,
                    message: format!("Template '{}' not found", id),
                    recommendations: Vec::new(),
                };
            }
        };

        let allowed = allowed_categories(chain);
        if allowed.contains(&template.category) {
            ChainCompatibility {
                valid: true,
                message: format!(
                    "Template '{}' ({}) is compatible with {}",
                    template.id, template.category, chain
                ),
                recommendations: Vec::new(),
            }
        } else {
            ChainCompatibility {
                valid: false,
                message: format!(
                    "Template '{}' ({}) is not deployable on {}",
                    template.id, template.category, chain
                ),
                recommendations: allowed.to_vec(),
            }
        }
    }

    /// Score every template against the requirements and return matches
    /// sorted by score descending. Templates scoring zero are excluded.
    ///
    /// Scoring is additive with no upper clamp: +50 for an asset-class
    /// match, +10 per shared compliance standard, +20 when the caller's
    /// minimum investment meets or exceeds the template's configured
    /// `min_investment`.
    pub fn get_recommendations(
        &self,
        requirements: &TemplateRequirements,
    ) -> Vec<TemplateRecommendation> {
        let mut recommendations: Vec<TemplateRecommendation> = self
            .templates
            .iter()
            .filter_map(|template| {
                let mut score = 0u32;
                let mut reasons: Vec<String> = Vec::new();

                if let Some(asset_class) = requirements.asset_class {
                    if template.category == asset_class {
                        score += 50;
                        reasons.push(format!("Matches asset class {}", asset_class));
                    }
                }

                for standard in &requirements.compliance_standards {
                    if template
                        .compliance_standards
                        .iter()
                        .any(|declared| declared == standard)
                    {
                        score += 10;
                        reasons.push(format!("Covers {}", standard));
                    }
                }

                if let (Some(min_investment), Some(configured)) = (
                    requirements.min_investment,
                    template
                        .configuration
                        .get("min_investment")
                        .and_then(JsonValue::as_f64),
                ) {
                    if min_investment >= configured {
                        score += 20;
                        reasons.push(format!(
                            "Minimum investment {} satisfies template floor {}",
                            min_investment, configured
                        ));
                    }
                }

                if score == 0 {
                    return None;
                }

                let reasoning = if reasons.is_empty() {
                    // Unreachable in practice since zero scores are dropped
                    "General compatibility".to_string()
                } else {
                    reasons.join("; ")
                };

                Some(TemplateRecommendation {
                    template: template.clone(),
                    score,
                    reasoning,
                })
            })
            .collect();

        recommendations.sort_by(|a, b| b.score.cmp(&a.score));
        recommendations
    }
}

// ============================================================================
// Seeded templates
// ============================================================================

fn config_map(value: JsonValue) -> Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    }
}

fn standards(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

fn kyc_verification_rule() -> RuleDefinition {
    RuleDefinition {
        id: "kyc_verification".to_string(),
        name: "KYC Verification".to_string(),
        category: RuleCategory::Compliance,
        condition: Condition::InvestorStatus {
            operator: ConditionOperator::Equals,
            value: "VERIFIED".to_string(),
        },
        action: ActionSpec::One(Action::Block {
            message: "Investor must complete KYC verification before trading".to_string(),
        }),
        priority: 1,
        dependencies: vec![],
        conflicts: vec![],
    }
}

fn equity_trading_basic() -> RuleTemplate {
    RuleTemplate {
        id: "equity_trading_basic".to_string(),
        name: "Equity Trading Basic".to_string(),
        description: "Baseline compliance controls for listed equity trading venues".to_string(),
        category: TemplateCategory::Equity,
        version: "1.0.0".to_string(),
        rules: vec![
            kyc_verification_rule(),
            RuleDefinition {
                id: "trading_hours_restriction".to_string(),
                name: "Trading Hours Restriction".to_string(),
                category: RuleCategory::Transaction,
                condition: Condition::TimeRange {
                    operator: ConditionOperator::Between,
                    start: "09:30".to_string(),
                    end: "16:00".to_string(),
                },
                action: ActionSpec::One(Action::Block {
                    message: "Orders are only accepted during regular market hours".to_string(),
                }),
                priority: 5,
                dependencies: vec![],
                conflicts: vec![],
            },
            RuleDefinition {
                id: "pattern_day_trader_check".to_string(),
                name: "Pattern Day Trader Check".to_string(),
                category: RuleCategory::Compliance,
                condition: Condition::AccountBalance {
                    operator: ConditionOperator::GreaterThanOrEqual,
                    value: 25_000.0,
                },
                action: ActionSpec::One(Action::RequireApproval {
                    message: "Pattern day traders must maintain a 25,000 minimum balance"
                        .to_string(),
                    approver_role: Some("compliance_officer".to_string()),
                }),
                priority: 3,
                dependencies: vec!["kyc_verification".to_string()],
                conflicts: vec![],
            },
            RuleDefinition {
                id: "position_limit_check".to_string(),
                name: "Position Limit Check".to_string(),
                category: RuleCategory::Security,
                condition: Condition::PositionSize {
                    operator: ConditionOperator::LessThanOrEqual,
                    value: 100_000.0,
                },
                action: ActionSpec::One(Action::Warn {
                    message: "Position exceeds the configured single-name limit".to_string(),
                }),
                priority: 8,
                dependencies: vec![],
                conflicts: vec![],
            },
        ],
        configuration: config_map(json!({
            "min_investment": 1000,
            "settlement_days": 2,
            "pdt_minimum_balance": 25000,
            "market_segment": "listed"
        })),
        compliance_standards: standards(&[
            "FINRA Rule 4210",
            "SEC Rule 15c3-3",
            "Regulation T",
        ]),
    }
}

fn fixed_income_basic() -> RuleTemplate {
    RuleTemplate {
        id: "fixed_income_basic".to_string(),
        name: "Fixed Income Basic".to_string(),
        description: "Settlement and credit-quality controls for bond trading desks".to_string(),
        category: TemplateCategory::FixedIncome,
        version: "1.0.0".to_string(),
        rules: vec![
            kyc_verification_rule(),
            RuleDefinition {
                id: "settlement_period_check".to_string(),
                name: "Settlement Period Check".to_string(),
                category: RuleCategory::Transaction,
                condition: Condition::SettlementDate {
                    operator: ConditionOperator::LessThanOrEqual,
                    value: 3,
                },
                action: ActionSpec::One(Action::DelaySettlement {
                    message: "Settlement beyond T+3 requires desk head sign-off".to_string(),
                    timeframe: "T+3".to_string(),
                }),
                priority: 4,
                dependencies: vec![],
                conflicts: vec![],
            },
            RuleDefinition {
                id: "bond_rating_minimum".to_string(),
                name: "Bond Rating Minimum".to_string(),
                category: RuleCategory::Compliance,
                condition: Condition::BondType {
                    operator: ConditionOperator::In,
                    value: vec![
                        "AAA".to_string(),
                        "AA".to_string(),
                        "A".to_string(),
                        "BBB".to_string(),
                    ],
                },
                action: ActionSpec::One(Action::Block {
                    message: "Only investment-grade bonds are eligible".to_string(),
                }),
                priority: 2,
                dependencies: vec![],
                conflicts: vec![],
            },
            RuleDefinition {
                id: "concentration_limit".to_string(),
                name: "Issuer Concentration Limit".to_string(),
                category: RuleCategory::Security,
                condition: Condition::Concentration {
                    operator: ConditionOperator::LessThanOrEqual,
                    value: 0.10,
                },
                action: ActionSpec::One(Action::Warn {
                    message: "Issuer concentration above 10% of portfolio".to_string(),
                }),
                priority: 7,
                dependencies: vec![],
                conflicts: vec![],
            },
        ],
        configuration: config_map(json!({
            "min_investment": 5000,
            "settlement_days": 2
        })),
        compliance_standards: standards(&[
            "MSRB Rule G-15",
            "TRACE Reporting",
            "SEC Rule 15c3-3",
        ]),
    }
}

fn private_securities_reg_d() -> RuleTemplate {
    RuleTemplate {
        id: "private_securities_reg_d".to_string(),
        name: "Private Securities Reg D".to_string(),
        description: "Reg D 506(b) private placement controls: accreditation, investor caps, and transfer lockups".to_string(),
        category: TemplateCategory::PrivateSecurities,
        version: "1.0.0".to_string(),
        rules: vec![
            kyc_verification_rule(),
            RuleDefinition {
                id: "accredited_investor_check".to_string(),
                name: "Accredited Investor Check".to_string(),
                category: RuleCategory::Compliance,
                condition: Condition::InvestorStatus {
                    operator: ConditionOperator::Equals,
                    value: "ACCREDITED".to_string(),
                },
                action: ActionSpec::One(Action::Block {
                    message: "Offering is limited to accredited investors".to_string(),
                }),
                priority: 1,
                dependencies: vec!["kyc_verification".to_string()],
                conflicts: vec!["retail_investor_access".to_string()],
            },
            RuleDefinition {
                id: "non_accredited_cap".to_string(),
                name: "Non-Accredited Investor Cap".to_string(),
                category: RuleCategory::Compliance,
                condition: Condition::TradeSize {
                    operator: ConditionOperator::LessThanOrEqual,
                    value: 35.0,
                },
                action: ActionSpec::One(Action::Block {
                    message: "Reg D 506(b) allows at most 35 non-accredited investors".to_string(),
                }),
                priority: 2,
                dependencies: vec!["accredited_investor_check".to_string()],
                conflicts: vec![],
            },
            RuleDefinition {
                id: "lockup_period_enforcement".to_string(),
                name: "Lockup Period Enforcement".to_string(),
                category: RuleCategory::Token,
                condition: Condition::SettlementDate {
                    operator: ConditionOperator::GreaterThanOrEqual,
                    value: 180,
                },
                action: ActionSpec::One(Action::Restrict {
                    message: "Securities are restricted during the lockup period".to_string(),
                    restrictions: vec!["transfer".to_string(), "pledge".to_string()],
                }),
                priority: 3,
                dependencies: vec!["accredited_investor_check".to_string()],
                conflicts: vec![],
            },
        ],
        configuration: config_map(json!({
            "min_investment": 25000,
            "max_non_accredited": 35,
            "lockup_days": 365
        })),
        compliance_standards: standards(&[
            "Reg D 506(b)",
            "SEC Rule 144",
            "Blue Sky Laws",
        ]),
    }
}

fn derivatives_advanced() -> RuleTemplate {
    RuleTemplate {
        id: "derivatives_advanced".to_string(),
        name: "Derivatives Advanced".to_string(),
        description: "Margin, suitability, and risk-limit controls for listed and OTC derivatives".to_string(),
        category: TemplateCategory::Derivatives,
        version: "1.0.0".to_string(),
        rules: vec![
            RuleDefinition {
                id: "options_level_check".to_string(),
                name: "Options Approval Level Check".to_string(),
                category: RuleCategory::Compliance,
                condition: Condition::OptionsLevel {
                    operator: ConditionOperator::GreaterThanOrEqual,
                    value: 2,
                },
                action: ActionSpec::One(Action::Block {
                    message: "Account options approval level is insufficient".to_string(),
                }),
                priority: 1,
                dependencies: vec![],
                conflicts: vec![],
            },
            RuleDefinition {
                id: "margin_requirement_check".to_string(),
                name: "Margin Requirement Check".to_string(),
                category: RuleCategory::Transaction,
                condition: Condition::MarginRatio {
                    operator: ConditionOperator::GreaterThanOrEqual,
                    value: 0.25,
                },
                action: ActionSpec::One(Action::CalculateMargin {
                    message: "Initial margin below the configured requirement".to_string(),
                    formula: "notional * margin_requirement".to_string(),
                }),
                priority: 2,
                dependencies: vec!["options_level_check".to_string()],
                conflicts: vec![],
            },
            RuleDefinition {
                id: "var_limit_check".to_string(),
                name: "Value-at-Risk Limit Check".to_string(),
                category: RuleCategory::Security,
                condition: Condition::VarLimit {
                    operator: ConditionOperator::LessThanOrEqual,
                    value: 100_000.0,
                },
                action: ActionSpec::One(Action::Warn {
                    message: "Portfolio VaR exceeds the desk limit".to_string(),
                }),
                priority: 5,
                dependencies: vec![],
                conflicts: vec![],
            },
            RuleDefinition {
                id: "netting_eligibility".to_string(),
                name: "Netting Eligibility".to_string(),
                category: RuleCategory::Transaction,
                condition: Condition::NettingEligible {
                    operator: ConditionOperator::Equals,
                    value: true,
                },
                action: ActionSpec::One(Action::Notify {
                    message: "Trade eligible for close-out netting".to_string(),
                    system: "collateral_management".to_string(),
                }),
                priority: 9,
                dependencies: vec![],
                conflicts: vec![],
            },
            RuleDefinition {
                id: "portfolio_stress_test".to_string(),
                name: "Portfolio Stress Test".to_string(),
                category: RuleCategory::Security,
                condition: Condition::ComplexCalculation {
                    operator: ConditionOperator::LessThanOrEqual,
                    formula: "stress_scenario_loss(portfolio, scenarios)".to_string(),
                    inputs: vec!["portfolio".to_string(), "scenarios".to_string()],
                },
                action: ActionSpec::Many(vec![
                    Action::Warn {
                        message: "Stress scenario loss above tolerance".to_string(),
                    },
                    Action::RequireApproval {
                        message: "Risk desk approval required for further exposure".to_string(),
                        approver_role: Some("risk_officer".to_string()),
                    },
                ]),
                priority: 6,
                dependencies: vec![
                    "var_limit_check".to_string(),
                    "margin_requirement_check".to_string(),
                ],
                conflicts: vec![],
            },
        ],
        configuration: config_map(json!({
            "min_investment": 10000,
            "margin_requirement": 0.25
        })),
        compliance_standards: standards(&[
            "CFTC Part 23",
            "EMIR",
            "Dodd-Frank Title VII",
        ]),
    }
}

fn hybrid_multi_asset() -> RuleTemplate {
    RuleTemplate {
        id: "hybrid_multi_asset".to_string(),
        name: "Hybrid Multi-Asset".to_string(),
        description: "Cross-asset portfolio controls combining prudential ratios with concentration limits".to_string(),
        category: TemplateCategory::Hybrid,
        version: "1.0.0".to_string(),
        rules: vec![
            kyc_verification_rule(),
            RuleDefinition {
                id: "capital_ratio_check".to_string(),
                name: "Capital Ratio Check".to_string(),
                category: RuleCategory::Compliance,
                condition: Condition::CapitalRatio {
                    operator: ConditionOperator::GreaterThanOrEqual,
                    value: 0.08,
                },
                action: ActionSpec::One(Action::Warn {
                    message: "Capital ratio below the Basel III floor".to_string(),
                }),
                priority: 2,
                dependencies: vec![],
                conflicts: vec![],
            },
            RuleDefinition {
                id: "liquidity_coverage_check".to_string(),
                name: "Liquidity Coverage Check".to_string(),
                category: RuleCategory::Compliance,
                condition: Condition::Lcr {
                    operator: ConditionOperator::GreaterThanOrEqual,
                    value: 1.0,
                },
                action: ActionSpec::One(Action::Warn {
                    message: "Liquidity coverage ratio below 100%".to_string(),
                }),
                priority: 3,
                dependencies: vec![],
                conflicts: vec![],
            },
            RuleDefinition {
                id: "cross_asset_concentration".to_string(),
                name: "Cross-Asset Concentration Limit".to_string(),
                category: RuleCategory::Security,
                condition: Condition::Concentration {
                    operator: ConditionOperator::LessThanOrEqual,
                    value: 0.20,
                },
                action: ActionSpec::One(Action::Warn {
                    message: "Single asset class above 20% of portfolio".to_string(),
                }),
                priority: 6,
                dependencies: vec![],
                conflicts: vec![],
            },
        ],
        configuration: config_map(json!({
            "min_investment": 50000
        })),
        compliance_standards: standards(&[
            "Basel III",
            "MiFID II",
            "FINRA Rule 4210",
        ]),
    }
}

fn commodities_trading() -> RuleTemplate {
    RuleTemplate {
        id: "commodities_trading".to_string(),
        name: "Commodities Trading".to_string(),
        description: "Position limit and delivery controls for physically settled commodities".to_string(),
        category: TemplateCategory::Commodities,
        version: "1.0.0".to_string(),
        rules: vec![
            RuleDefinition {
                id: "delivery_intent_declaration".to_string(),
                name: "Delivery Intent Declaration".to_string(),
                category: RuleCategory::Transaction,
                condition: Condition::DeliveryIntent {
                    operator: ConditionOperator::In,
                    value: vec!["PHYSICAL".to_string(), "CASH".to_string()],
                },
                action: ActionSpec::One(Action::Block {
                    message: "Delivery intent must be declared before expiry week".to_string(),
                }),
                priority: 1,
                dependencies: vec![],
                conflicts: vec![],
            },
            RuleDefinition {
                id: "commodity_position_limit".to_string(),
                name: "Commodity Position Limit".to_string(),
                category: RuleCategory::Security,
                condition: Condition::PositionSize {
                    operator: ConditionOperator::LessThanOrEqual,
                    value: 25_000.0,
                },
                action: ActionSpec::One(Action::Block {
                    message: "Position exceeds the CFTC speculative limit".to_string(),
                }),
                priority: 2,
                dependencies: vec![],
                conflicts: vec![],
            },
            RuleDefinition {
                id: "price_movement_halt".to_string(),
                name: "Price Movement Halt".to_string(),
                category: RuleCategory::Transaction,
                condition: Condition::PriceMovement {
                    operator: ConditionOperator::Between,
                    value: 0.07,
                    window_minutes: Some(60),
                },
                action: ActionSpec::One(Action::Warn {
                    message: "Daily price limit reached; trading halted".to_string(),
                }),
                priority: 4,
                dependencies: vec![],
                conflicts: vec![],
            },
        ],
        configuration: config_map(json!({
            "min_investment": 20000,
            "daily_price_limit": 0.07
        })),
        compliance_standards: standards(&[
            "CFTC Position Limits",
            "Dodd-Frank Title VII",
        ]),
    }
}
