//! Engine configuration, read from TOML
//!
//! ```toml
//! signature_token_ttl_minutes = 60
//! default_location = "main-store"
//!
//! [[roles]]
//! name = "hod"
//! grants = [{ module = "stationary", actions = ["approve", "reject"], scope = "department" }]
//! ```
use super::auth::{Grant, PolicyMatrix};
use super::error::{WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lifetime of a borrow signature link
    #[serde(default = "default_token_ttl")]
    pub signature_token_ttl_minutes: i64,

    /// Bounded retries for transient storage failures
    #[serde(default = "default_storage_retries")]
    pub storage_retries: u32,

    /// Stock location used when a requisition or PO names none
    #[serde(default = "default_location")]
    pub default_location: String,

    #[serde(default)]
    pub roles: Vec<RoleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

fn default_token_ttl() -> i64 {
    24 * 60
}

fn default_storage_retries() -> u32 {
    3
}

fn default_location() -> String {
    "main-store".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signature_token_ttl_minutes: default_token_ttl(),
            storage_retries: default_storage_retries(),
            default_location: default_location(),
            roles: vec![],
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> WorkflowResult<Self> {
        let config: EngineConfig =
            toml::from_str(raw).map_err(|e| WorkflowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> WorkflowResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            WorkflowError::Config(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> WorkflowResult<()> {
        if self.signature_token_ttl_minutes <= 0 {
            return Err(WorkflowError::Config(
                "signature_token_ttl_minutes must be positive".into(),
            ));
        }
        if self.default_location.trim().is_empty() {
            return Err(WorkflowError::Config("default_location is empty".into()));
        }
        Ok(())
    }

    pub fn policy(&self) -> PolicyMatrix {
        self.roles.iter().fold(PolicyMatrix::new(), |matrix, role| {
            role.grants
                .iter()
                .fold(matrix, |m, g| m.grant(&role.name, g.clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Action, Authorizer, Module, ScopeContext};
    use crate::types::Actor;

    #[test]
    fn empty_document_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.signature_token_ttl_minutes, 1440);
        assert_eq!(config.storage_retries, 3);
        assert_eq!(config.default_location, "main-store");
    }

    #[test]
    fn roles_become_a_policy_matrix() {
        let config = EngineConfig::from_toml_str(
            r#"
            signature_token_ttl_minutes = 30

            [[roles]]
            name = "technician"
            grants = [
                { module = "tickets", actions = ["assign", "resolve"], scope = "global" },
            ]
            "#,
        )
        .unwrap();

        let tech = Actor::new("t1").with_role("technician");
        let policy = config.policy();
        assert!(policy.can_perform(&tech, Module::Tickets, Action::Resolve, &ScopeContext::global()));
        assert!(!policy.can_perform(&tech, Module::Tickets, Action::Close, &ScopeContext::global()));
    }

    #[test]
    fn rejects_non_positive_ttl() {
        let err = EngineConfig::from_toml_str("signature_token_ttl_minutes = 0").unwrap_err();
        assert!(matches!(err, WorkflowError::Config(_)));
    }
}
