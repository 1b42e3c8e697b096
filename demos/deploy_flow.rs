//! Deploy Flow Demo - Template to Deployed Rule Set
//!
//! This example walks the full lifecycle: apply a seeded template with a
//! customization, inspect the validation reports, and deploy the resulting
//! rule set through a canned deployer (no chain connectivity required).

use std::sync::Arc;

use cm_rules::{
    DeployRequest, InMemoryRuleSetRepository, RuleOverride, RuleSetService, StaticDeployer,
    TargetChain, TemplateApplyFields, TemplateCatalog, TemplateCustomization,
    TemplateRequirements,
};

#[tokio::main]
async fn main() -> cm_rules::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let catalog = Arc::new(TemplateCatalog::new());
    let service = RuleSetService::new(
        Arc::new(InMemoryRuleSetRepository::new()),
        Arc::clone(&catalog),
        Arc::new(StaticDeployer::succeeding(
            "0x8f3c0b1fa0d2c9e4",
            "0x51b7a90c2dd4e6f8",
        )),
    );

    // 1. Ask the catalog what fits an equity desk
    let recommendations = catalog.get_recommendations(&TemplateRequirements {
        asset_class: Some(cm_rules::TemplateCategory::Equity),
        compliance_standards: vec!["FINRA Rule 4210".to_string()],
        min_investment: Some(5_000.0),
    });
    for recommendation in &recommendations {
        println!(
            "candidate: {} (score {}) - {}",
            recommendation.template.id, recommendation.score, recommendation.reasoning
        );
    }

    // 2. Check the target chain before composing anything
    let compatibility =
        catalog.validate_chain_compatibility("equity_trading_basic", TargetChain::Evm);
    println!("chain check: {}", compatibility.message);

    // 3. Apply the template with a customization
    let mut customization = TemplateCustomization::default();
    customization
        .configuration
        .insert("min_investment".to_string(), serde_json::json!(5_000));
    customization.rule_overrides.insert(
        "position_limit_check".to_string(),
        RuleOverride {
            priority: Some(2),
            ..Default::default()
        },
    );

    let rule_set = service
        .apply_template(
            "equity_trading_basic",
            &customization,
            TemplateApplyFields {
                name: Some("Equity Desk Controls".to_string()),
                description: Some("Production controls for the cash equity desk".to_string()),
                chain: Some(TargetChain::Evm),
                ..Default::default()
            },
            "ops@desk",
        )
        .await?;
    println!(
        "created rule set {} with {} rules",
        rule_set.id,
        rule_set.memberships.len()
    );

    // 4. Pre-check, then deploy
    let summary = service.validate_rule_set(rule_set.id).await?;
    println!(
        "pre-check: valid={} errors={} warnings={}",
        summary.valid,
        summary.errors.len(),
        summary.warnings.len()
    );

    let record = service
        .deploy_rule_set(rule_set.id, DeployRequest::default())
        .await?;
    println!(
        "deployed: contract={} tx={}",
        record.contract_address, record.transaction_hash
    );

    let history = service.deployment_history(rule_set.id).await?;
    println!("deployment history entries: {}", history.len());

    Ok(())
}
