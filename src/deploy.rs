//! External chain deployment boundary
//!
//! Publishing a validated rule set is delegated to an external
//! blockchain-backed rule engine, treated here as an opaque asynchronous
//! collaborator: it either returns a contract address and transaction
//! hash or fails. No retry or timeout semantics are applied at this
//! boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::model::TargetChain;

/// Options forwarded to the deployment collaborator. The contract name is
/// derived from the rule set name with whitespace replaced by underscores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployOptions {
    pub contract_name: String,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
}

/// Result of a successful chain deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDeployment {
    pub contract_address: String,
    pub transaction_hash: String,
}

/// The external rule-deployment collaborator (owned by a separate
/// business-rule-engine module; unspecified beyond this contract).
#[async_trait]
pub trait ChainDeployer: Send + Sync {
    async fn deploy_rules(
        &self,
        rule_ids: &[String],
        chain: TargetChain,
        options: &DeployOptions,
    ) -> anyhow::Result<ChainDeployment>;
}

/// Canned deployer for tests and demos: always returns the configured
/// outcome.
pub struct StaticDeployer {
    outcome: Result<ChainDeployment, String>,
}

impl StaticDeployer {
    pub fn succeeding(contract_address: &str, transaction_hash: &str) -> Self {
        Self {
            outcome: Ok(ChainDeployment {
                contract_address: contract_address.to_string(),
                transaction_hash: transaction_hash.to_string(),
            }),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl ChainDeployer for StaticDeployer {
    async fn deploy_rules(
        &self,
        _rule_ids: &[String],
        _chain: TargetChain,
        _options: &DeployOptions,
    ) -> anyhow::Result<ChainDeployment> {
        match &self.outcome {
            Ok(deployment) => Ok(deployment.clone()),
            Err(message) => Err(anyhow::anyhow!("{}", message)),
        }
    }
}
