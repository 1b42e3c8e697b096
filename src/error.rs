//! Error handling for the rule management subsystem
//!
//! This module provides idiomatic Rust error types using thiserror for
//! better error messages and proper error chain handling. The taxonomy
//! follows the three failure classes the service surfaces to callers:
//! not-found lookups, rejected validations, and unexpected deployment
//! failures (logged and re-surfaced, never swallowed).

use thiserror::Error;
use uuid::Uuid;

use crate::model::RuleSetStatus;

/// Main error type for the rule management system
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Template '{0}' not found")]
    TemplateNotFound(String),

    #[error("Rule set {0} not found")]
    RuleSetNotFound(Uuid),

    /// Validation rejected a rule set at the deployment gate. The payload
    /// is the JSON-encoded list of validation errors so callers can
    /// surface the full list, not just the first failure.
    #[error("Rule set validation failed: {errors}")]
    ValidationRejected { errors: String },

    #[error("Invalid status transition for rule set {rule_set_id}: {from} -> {to}")]
    InvalidTransition {
        rule_set_id: Uuid,
        from: RuleSetStatus,
        to: RuleSetStatus,
    },

    /// Failure raised by the external chain deployment collaborator.
    #[error("Chain deployment failed: {0}")]
    Deployment(#[from] anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, RuleError>;
