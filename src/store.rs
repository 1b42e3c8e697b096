//! Rule set storage and service operations
//!
//! The repository is an explicit injected abstraction (in-memory map
//! today, a database later) rather than ambient global state. The
//! service layers the domain operations on top: creation, membership
//! appends, dependency validation, the lightweight pre-check, template
//! application, and the deployment gate.
//!
//! Status transitions are claimed through a compare-and-set on the
//! repository, so two concurrent deployments of the same rule set
//! cannot both move it into `Deploying`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::TemplateCatalog;
use crate::dependency::{DependencyReport, DependencyValidator};
use crate::deploy::{ChainDeployer, DeployOptions};
use crate::error::{Result, RuleError};
use crate::model::{
    DeploymentRecord, NewRuleSetFields, RuleSet, RuleSetFilter, RuleSetMembership, RuleSetStatus,
    TargetChain, TemplateCategory, TemplateCustomization,
};
use crate::validator::RuleSetValidator;

// ============================================================================
// Repository
// ============================================================================

/// Persistence seam for rule sets and deployment history
#[async_trait]
pub trait RuleSetRepository: Send + Sync {
    async fn insert(&self, rule_set: RuleSet) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<RuleSet>>;
    async fn update(&self, rule_set: RuleSet) -> Result<()>;
    async fn list(&self, filter: &RuleSetFilter) -> Result<Vec<RuleSet>>;
    /// Atomically move a rule set from `from` to `to`. Returns false when
    /// the current status does not match `from` (a concurrent writer won).
    async fn transition_status(
        &self,
        id: Uuid,
        from: RuleSetStatus,
        to: RuleSetStatus,
    ) -> Result<bool>;
    async fn record_deployment(&self, record: DeploymentRecord) -> Result<()>;
    async fn deployment_history(&self, rule_set_id: Uuid) -> Result<Vec<DeploymentRecord>>;
}

/// Process-local repository backed by a map; the default for tests and
/// single-process deployments.
#[derive(Default)]
pub struct InMemoryRuleSetRepository {
    rule_sets: RwLock<HashMap<Uuid, RuleSet>>,
    deployments: RwLock<Vec<DeploymentRecord>>,
}

impl InMemoryRuleSetRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleSetRepository for InMemoryRuleSetRepository {
    async fn insert(&self, rule_set: RuleSet) -> Result<()> {
        self.rule_sets.write().await.insert(rule_set.id, rule_set);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<RuleSet>> {
        Ok(self.rule_sets.read().await.get(&id).cloned())
    }

    async fn update(&self, rule_set: RuleSet) -> Result<()> {
        self.rule_sets.write().await.insert(rule_set.id, rule_set);
        Ok(())
    }

    async fn list(&self, filter: &RuleSetFilter) -> Result<Vec<RuleSet>> {
        let rule_sets = self.rule_sets.read().await;
        let mut matches: Vec<RuleSet> = rule_sets
            .values()
            .filter(|rs| filter.category.map_or(true, |c| rs.category == c))
            .filter(|rs| filter.status.map_or(true, |s| rs.status == s))
            .filter(|rs| {
                filter
                    .created_by
                    .as_ref()
                    .map_or(true, |creator| &rs.created_by == creator)
            })
            .cloned()
            .collect();
        matches.sort_by_key(|rs| rs.created_at);
        Ok(matches)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: RuleSetStatus,
        to: RuleSetStatus,
    ) -> Result<bool> {
        let mut rule_sets = self.rule_sets.write().await;
        match rule_sets.get_mut(&id) {
            Some(rule_set) if rule_set.status == from => {
                rule_set.status = to;
                rule_set.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(RuleError::RuleSetNotFound(id)),
        }
    }

    async fn record_deployment(&self, record: DeploymentRecord) -> Result<()> {
        self.deployments.write().await.push(record);
        Ok(())
    }

    async fn deployment_history(&self, rule_set_id: Uuid) -> Result<Vec<DeploymentRecord>> {
        Ok(self
            .deployments
            .read()
            .await
            .iter()
            .filter(|record| record.rule_set_id == rule_set_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Service
// ============================================================================

/// Lightweight validation summary from the service-level pre-check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Deployment request options supplied by the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployRequest {
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Caller-supplied fields when creating a rule set from a template
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateApplyFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<TargetChain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_type: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Rule set management service: composition, validation, and deployment
/// gating over an injected repository and deployment collaborator.
pub struct RuleSetService {
    repository: Arc<dyn RuleSetRepository>,
    catalog: Arc<TemplateCatalog>,
    deployer: Arc<dyn ChainDeployer>,
}

impl RuleSetService {
    pub fn new(
        repository: Arc<dyn RuleSetRepository>,
        catalog: Arc<TemplateCatalog>,
        deployer: Arc<dyn ChainDeployer>,
    ) -> Self {
        Self {
            repository,
            catalog,
            deployer,
        }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Create a rule set. Category defaults to HYBRID and chain to evm
    /// when omitted. When `rule_ids` is non-empty the rules are appended
    /// immediately, so the returned set already carries memberships.
    pub async fn create_rule_set(
        &self,
        fields: NewRuleSetFields,
        created_by: &str,
    ) -> Result<RuleSet> {
        let now = Utc::now();
        let rule_set = RuleSet {
            id: Uuid::new_v4(),
            name: fields.name,
            description: fields.description,
            category: fields.category.unwrap_or(TemplateCategory::Hybrid),
            instrument_type: fields.instrument_type,
            template_id: fields.template_id,
            created_by: created_by.to_string(),
            status: RuleSetStatus::Draft,
            metadata: fields.metadata,
            chain: fields.chain.unwrap_or(TargetChain::Evm),
            memberships: Vec::new(),
            created_at: now,
            updated_at: now,
            contract_address: None,
            transaction_hash: None,
            deployed_at: None,
        };
        let id = rule_set.id;
        info!(rule_set_id = %id, name = %rule_set.name, "created rule set");
        self.repository.insert(rule_set).await?;

        if fields.rule_ids.is_empty() {
            self.get_rule_set(id).await
        } else {
            self.add_rules_to_set(id, &fields.rule_ids, created_by).await
        }
    }

    /// Append rules to a set. Order indices continue from the current
    /// membership count and are never renumbered.
    ///
    /// Dependency validation runs over the full resulting membership list
    /// after the append; a failing validation is logged but does NOT roll
    /// back the append; callers inspect `validate_rule_dependencies`
    /// separately when they need the report.
    pub async fn add_rules_to_set(
        &self,
        rule_set_id: Uuid,
        rule_ids: &[String],
        user_id: &str,
    ) -> Result<RuleSet> {
        let mut rule_set = self.get_rule_set(rule_set_id).await?;

        let base = rule_set.memberships.len() as u32;
        let now = Utc::now();
        for (position, rule_id) in rule_ids.iter().enumerate() {
            rule_set.memberships.push(RuleSetMembership {
                id: Uuid::new_v4(),
                rule_set_id,
                rule_id: rule_id.clone(),
                order_index: base + position as u32,
                required: true,
                enabled: true,
                added_by: user_id.to_string(),
                added_at: now,
            });
        }
        rule_set.updated_at = now;
        self.repository.update(rule_set.clone()).await?;

        let report = self.validate_rule_dependencies(&rule_set.rule_ids());
        if report.valid {
            info!(
                rule_set_id = %rule_set_id,
                appended = rule_ids.len(),
                total = rule_set.memberships.len(),
                "appended rules to set"
            );
        } else {
            warn!(
                rule_set_id = %rule_set_id,
                missing = report.missing_dependencies.len(),
                conflicts = report.conflicts.len(),
                "appended rules failed dependency validation; memberships retained"
            );
        }

        Ok(rule_set)
    }

    /// Validate a set of rule ids against the static dependency and
    /// conflict tables. Circular dependencies are warnings at this level.
    pub fn validate_rule_dependencies(&self, rule_ids: &[String]) -> DependencyReport {
        DependencyValidator::validate(rule_ids)
    }

    /// Lightweight pre-check: minimum one rule, category-specific
    /// accreditation warning, duplicate detection, and the dependency
    /// report folded in.
    pub async fn validate_rule_set(&self, rule_set_id: Uuid) -> Result<ValidationSummary> {
        let rule_set = self.get_rule_set(rule_set_id).await?;
        let rule_ids = rule_set.rule_ids();

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if rule_ids.is_empty() {
            errors.push("Rule set must contain at least one rule".to_string());
        }

        if matches!(
            rule_set.category,
            TemplateCategory::Equity | TemplateCategory::PrivateSecurities
        ) && !rule_ids.iter().any(|id| id == "accredited_investor_check")
        {
            warnings.push(format!(
                "{} rule sets usually include 'accredited_investor_check'",
                rule_set.category
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for rule_id in &rule_ids {
            if !seen.insert(rule_id.as_str()) {
                errors.push(format!("Duplicate rule id '{}' in rule set", rule_id));
            }
        }

        let report = self.validate_rule_dependencies(&rule_ids);
        for missing in &report.missing_dependencies {
            errors.push(format!(
                "Rule '{}' requires '{}' which is not in the rule set",
                missing.rule_id, missing.requires
            ));
        }
        for conflict in &report.conflicts {
            errors.push(format!(
                "Rule '{}' conflicts with '{}'",
                conflict.rule_id, conflict.conflicts_with
            ));
        }
        warnings.extend(report.warnings);

        Ok(ValidationSummary {
            valid: errors.is_empty(),
            errors,
            warnings,
        })
    }

    /// Deploy a rule set to its target chain.
    ///
    /// The full validator gates the deployment: on failure the typed
    /// error carries the JSON-encoded error list and the status is left
    /// untouched. The `Draft -> Deploying` transition is claimed
    /// atomically; success lands on `Deployed` with a history record,
    /// failure lands on `Failed` with the error re-surfaced.
    pub async fn deploy_rule_set(
        &self,
        rule_set_id: Uuid,
        request: DeployRequest,
    ) -> Result<DeploymentRecord> {
        let rule_set = self.get_rule_set(rule_set_id).await?;

        let definitions: Vec<_> = rule_set
            .rule_ids()
            .iter()
            .filter_map(|id| self.catalog.rule_definition(id).cloned())
            .collect();
        let report = RuleSetValidator::validate_rule_set(&rule_set, &definitions);
        if !report.valid {
            warn!(
                rule_set_id = %rule_set_id,
                errors = report.errors.len(),
                "deployment rejected by validation"
            );
            return Err(RuleError::ValidationRejected {
                errors: serde_json::to_string(&report.errors)?,
            });
        }

        let claimed = self
            .repository
            .transition_status(rule_set_id, RuleSetStatus::Draft, RuleSetStatus::Deploying)
            .await?;
        if !claimed {
            return Err(RuleError::InvalidTransition {
                rule_set_id,
                from: rule_set.status,
                to: RuleSetStatus::Deploying,
            });
        }

        let contract_name: String = rule_set
            .name
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect();
        let options = DeployOptions {
            contract_name,
            metadata: request.metadata,
        };
        let rule_ids = rule_set.rule_ids();

        info!(
            rule_set_id = %rule_set_id,
            chain = %rule_set.chain,
            rules = rule_ids.len(),
            "deploying rule set"
        );

        match self
            .deployer
            .deploy_rules(&rule_ids, rule_set.chain, &options)
            .await
        {
            Ok(deployment) => {
                let completed = self
                    .repository
                    .transition_status(
                        rule_set_id,
                        RuleSetStatus::Deploying,
                        RuleSetStatus::Deployed,
                    )
                    .await?;

                let deployed_at = Utc::now();
                if completed {
                    let mut updated = self.get_rule_set(rule_set_id).await?;
                    updated.contract_address = Some(deployment.contract_address.clone());
                    updated.transaction_hash = Some(deployment.transaction_hash.clone());
                    updated.deployed_at = Some(deployed_at);
                    updated.updated_at = deployed_at;
                    self.repository.update(updated).await?;
                } else {
                    // A concurrent writer moved the set out of deploying;
                    // leave its state alone but still record the deployment
                    // that happened on chain.
                    warn!(
                        rule_set_id = %rule_set_id,
                        "rule set left deploying state concurrently; contract fields not updated"
                    );
                }

                let record = DeploymentRecord {
                    id: Uuid::new_v4(),
                    rule_set_id,
                    contract_address: deployment.contract_address,
                    transaction_hash: deployment.transaction_hash,
                    deployed_at,
                };
                self.repository.record_deployment(record.clone()).await?;
                info!(
                    rule_set_id = %rule_set_id,
                    contract = %record.contract_address,
                    "rule set deployed"
                );
                Ok(record)
            }
            Err(cause) => {
                error!(rule_set_id = %rule_set_id, error = %cause, "deployment failed");
                let marked = self
                    .repository
                    .transition_status(
                        rule_set_id,
                        RuleSetStatus::Deploying,
                        RuleSetStatus::Failed,
                    )
                    .await?;
                if !marked {
                    warn!(
                        rule_set_id = %rule_set_id,
                        "rule set left deploying state concurrently; failed status not recorded"
                    );
                }
                Err(RuleError::Deployment(cause))
            }
        }
    }

    pub async fn get_rule_set(&self, rule_set_id: Uuid) -> Result<RuleSet> {
        self.repository
            .get(rule_set_id)
            .await?
            .ok_or(RuleError::RuleSetNotFound(rule_set_id))
    }

    /// List rule sets, AND-combining all supplied filters
    pub async fn list_rule_sets(&self, filter: &RuleSetFilter) -> Result<Vec<RuleSet>> {
        self.repository.list(filter).await
    }

    pub async fn deployment_history(&self, rule_set_id: Uuid) -> Result<Vec<DeploymentRecord>> {
        self.repository.deployment_history(rule_set_id).await
    }

    /// Create a rule set from a template: applies the template through
    /// the catalog, then persists a set referencing the template's rules.
    ///
    /// The applied configuration is merged into the set's metadata at the
    /// top level so the deployment-gate threshold checks see configured
    /// values; caller-supplied metadata keys win on collision.
    pub async fn apply_template(
        &self,
        template_id: &str,
        customization: &TemplateCustomization,
        fields: TemplateApplyFields,
        created_by: &str,
    ) -> Result<RuleSet> {
        let applied = self.catalog.apply_template(template_id, customization)?;

        let mut metadata = applied.configuration.clone();
        for (key, value) in fields.metadata {
            metadata.insert(key, value);
        }
        metadata.insert(
            "compliance_standards".to_string(),
            serde_json::json!(applied.compliance_standards),
        );

        let rule_ids = applied
            .rules
            .iter()
            .map(|rule| rule.definition.id.clone())
            .collect();

        self.create_rule_set(
            NewRuleSetFields {
                name: fields.name.unwrap_or_else(|| applied.name.clone()),
                description: fields
                    .description
                    .unwrap_or_else(|| applied.description.clone()),
                category: Some(applied.category),
                instrument_type: fields.instrument_type,
                template_id: Some(applied.template_id.clone()),
                chain: fields.chain,
                metadata,
                rule_ids,
            },
            created_by,
        )
        .await
    }
}
