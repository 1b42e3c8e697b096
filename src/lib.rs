//! Capital-Markets Rule Management
//!
//! Templates capture common regulatory trading scenarios - named,
//! versioned bundles of condition/action rules plus default
//! configuration. Users compose rule sets from them, the validators
//! check dependency, conflict, and policy constraints, and validated
//! sets are published to an external chain-backed rule engine.
//!
//! Key concepts:
//! - Templates are seeded at startup and immutable; application always
//!   deep-clones and stamps fresh deployment ids
//! - Rule relationships (`requires`/`conflicts`) constrain which rules
//!   may co-exist in one set; cycles are detected by DFS
//! - Rule set status moves one way: draft -> deploying -> deployed|failed
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cm_rules::{
//!     InMemoryRuleSetRepository, RuleSetService, StaticDeployer, TemplateApplyFields,
//!     TemplateCatalog, TemplateCustomization,
//! };
//!
//! # async fn demo() -> cm_rules::Result<()> {
//! let service = RuleSetService::new(
//!     Arc::new(InMemoryRuleSetRepository::new()),
//!     Arc::new(TemplateCatalog::new()),
//!     Arc::new(StaticDeployer::succeeding("0xabc", "0xdeadbeef")),
//! );
//! let rule_set = service
//!     .apply_template(
//!         "equity_trading_basic",
//!         &TemplateCustomization::default(),
//!         TemplateApplyFields::default(),
//!         "ops@desk",
//!     )
//!     .await?;
//! service
//!     .deploy_rule_set(rule_set.id, Default::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod dependency;
pub mod deploy;
pub mod error;
pub mod model;
pub mod store;
pub mod validator;

pub use catalog::{
    allowed_categories, ChainCompatibility, TemplateCatalog, TemplateRecommendation,
    TemplateRequirements,
};
pub use dependency::{ConflictEntry, DependencyReport, DependencyValidator, MissingDependency};
pub use deploy::{ChainDeployer, ChainDeployment, DeployOptions, StaticDeployer};
pub use error::{Result, RuleError};
pub use model::{
    Action, ActionSpec, AppliedTemplate, Condition, ConditionOperator, DeployableRule,
    DeploymentRecord, NewRuleSetFields, RuleCategory, RuleDefinition, RuleOverride, RuleSet,
    RuleSetFilter, RuleSetMembership, RuleSetStatus, RuleTemplate, TargetChain, TemplateCategory,
    TemplateCustomization, TemplateFilter,
};
pub use store::{
    DeployRequest, InMemoryRuleSetRepository, RuleSetRepository, RuleSetService,
    TemplateApplyFields, ValidationSummary,
};
pub use validator::{RuleSetValidator, SingleRuleReport, ValidationReport};
