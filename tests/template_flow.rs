//! Integration tests for template application through the service
//!
//! These tests verify:
//! 1. Template application bridges catalog output into persisted rule sets
//! 2. Customization (configuration merge + rule overrides) flows through
//! 3. Chain compatibility checks against the static category tables
//! 4. Recommendation scoring and ranking

use std::sync::Arc;

use cm_rules::{
    DeployRequest, InMemoryRuleSetRepository, RuleError, RuleOverride, RuleSetService,
    RuleSetStatus, StaticDeployer, TargetChain, TemplateApplyFields, TemplateCatalog,
    TemplateCategory, TemplateCustomization, TemplateRequirements,
};

fn service() -> RuleSetService {
    RuleSetService::new(
        Arc::new(InMemoryRuleSetRepository::new()),
        Arc::new(TemplateCatalog::new()),
        Arc::new(StaticDeployer::succeeding("0x1", "0x2")),
    )
}

#[tokio::test]
async fn apply_template_creates_a_draft_rule_set_from_template_rules() {
    let service = service();
    let rule_set = service
        .apply_template(
            "fixed_income_basic",
            &TemplateCustomization::default(),
            TemplateApplyFields {
                name: Some("Bond Desk Controls".to_string()),
                chain: Some(TargetChain::Evm),
                ..Default::default()
            },
            "ops@desk",
        )
        .await
        .unwrap();

    assert_eq!(rule_set.name, "Bond Desk Controls");
    assert_eq!(rule_set.category, TemplateCategory::FixedIncome);
    assert_eq!(rule_set.template_id.as_deref(), Some("fixed_income_basic"));
    assert_eq!(rule_set.status, RuleSetStatus::Draft);
    assert_eq!(
        rule_set.rule_ids(),
        vec![
            "kyc_verification",
            "settlement_period_check",
            "bond_rating_minimum",
            "concentration_limit",
        ]
    );
    // Template configuration and standards land at the top level of
    // metadata, where the deployment-gate checks read them
    assert_eq!(
        rule_set.metadata.get("settlement_days"),
        Some(&serde_json::json!(2))
    );
    assert_eq!(
        rule_set.metadata.get("min_investment"),
        Some(&serde_json::json!(5000))
    );
    assert!(rule_set.metadata.contains_key("compliance_standards"));
}

#[tokio::test]
async fn customization_configuration_wins_per_key() {
    let service = service();
    let mut customization = TemplateCustomization::default();
    customization
        .configuration
        .insert("min_investment".to_string(), serde_json::json!(75_000));
    customization.rule_overrides.insert(
        "settlement_period_check".to_string(),
        RuleOverride {
            priority: Some(1),
            ..Default::default()
        },
    );

    let rule_set = service
        .apply_template(
            "fixed_income_basic",
            &customization,
            TemplateApplyFields::default(),
            "ops@desk",
        )
        .await
        .unwrap();

    assert_eq!(
        rule_set.metadata.get("min_investment"),
        Some(&serde_json::json!(75_000))
    );
    // Template keys not overridden pass through
    assert_eq!(
        rule_set.metadata.get("settlement_days"),
        Some(&serde_json::json!(2))
    );

    // The catalog itself is untouched by the customization
    let template = service
        .catalog()
        .get_template("fixed_income_basic")
        .unwrap();
    assert_eq!(
        template.configuration.get("min_investment"),
        Some(&serde_json::json!(5000))
    );
}

#[tokio::test]
async fn caller_metadata_wins_over_template_configuration() {
    let service = service();
    let mut metadata = serde_json::Map::new();
    metadata.insert("min_investment".to_string(), serde_json::json!(100_000));

    let rule_set = service
        .apply_template(
            "fixed_income_basic",
            &TemplateCustomization::default(),
            TemplateApplyFields {
                metadata,
                ..Default::default()
            },
            "ops@desk",
        )
        .await
        .unwrap();

    assert_eq!(
        rule_set.metadata.get("min_investment"),
        Some(&serde_json::json!(100_000))
    );
}

#[tokio::test]
async fn customized_reg_d_cap_above_thirty_five_is_rejected_at_the_gate() {
    let service = service();
    let mut customization = TemplateCustomization::default();
    customization
        .configuration
        .insert("max_non_accredited".to_string(), serde_json::json!(40));

    let rule_set = service
        .apply_template(
            "private_securities_reg_d",
            &customization,
            TemplateApplyFields::default(),
            "ops@desk",
        )
        .await
        .unwrap();

    let result = service
        .deploy_rule_set(rule_set.id, DeployRequest::default())
        .await;
    match result {
        Err(RuleError::ValidationRejected { errors }) => {
            let parsed: Vec<String> = serde_json::from_str(&errors).unwrap();
            assert!(parsed.iter().any(|e| e.contains("35")), "{:?}", parsed);
        }
        other => panic!("expected ValidationRejected, got {:?}", other.map(|_| ())),
    }

    let untouched = service.get_rule_set(rule_set.id).await.unwrap();
    assert_eq!(untouched.status, RuleSetStatus::Draft);
}

#[tokio::test]
async fn equity_template_is_valid_on_solana() {
    let catalog = TemplateCatalog::new();
    let result = catalog.validate_chain_compatibility("equity_trading_basic", TargetChain::Solana);
    assert!(result.valid, "{}", result.message);
    assert!(result.recommendations.is_empty());
}

#[tokio::test]
async fn private_securities_template_is_rejected_on_solana_with_recommendations() {
    let catalog = TemplateCatalog::new();
    let result =
        catalog.validate_chain_compatibility("private_securities_reg_d", TargetChain::Solana);
    assert!(!result.valid);
    assert_eq!(
        result.recommendations,
        vec![
            TemplateCategory::Equity,
            TemplateCategory::Derivatives,
            TemplateCategory::Hybrid,
        ]
    );
}

#[tokio::test]
async fn commodities_template_is_deployable_on_neither_chain() {
    let catalog = TemplateCatalog::new();
    for chain in [TargetChain::Evm, TargetChain::Solana] {
        let result = catalog.validate_chain_compatibility("commodities_trading", chain);
        assert!(!result.valid, "commodities unexpectedly valid on {}", chain);
        assert!(!result.recommendations.is_empty());
    }
}

#[tokio::test]
async fn recommendations_rank_equity_template_above_non_matches() {
    let catalog = TemplateCatalog::new();
    let recommendations = catalog.get_recommendations(&TemplateRequirements {
        asset_class: Some(TemplateCategory::Equity),
        compliance_standards: vec!["FINRA Rule 4210".to_string()],
        min_investment: None,
    });

    assert_eq!(recommendations[0].template.id, "equity_trading_basic");
    assert!(recommendations[0].score >= 60);
    assert!(recommendations[0].reasoning.contains("EQUITY"));
    // Descending order throughout
    for window in recommendations.windows(2) {
        assert!(window[0].score >= window[1].score);
    }
}
