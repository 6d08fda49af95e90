//! Security configuration, persisted as TOML.
//!
//! [`SecurityConfig`] is the serialized form with string IRIs; [`validate`]
//! turns it into [`Settings`] with parsed IRIs that the engine consumes.
//!
//! [`validate`]: SecurityConfig::validate

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{Agent, Context, named_node};

/// Serialized security configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Principal with universal access.
    #[serde(default = "default_system_agent")]
    pub system_agent: String,
    /// Principal used when nobody is authenticated.
    #[serde(default = "default_anonymous_agent")]
    pub anonymous_agent: String,
    /// Context holding context owners and context-level authorizations.
    #[serde(default = "default_metadata_context")]
    pub metadata_context: String,
    /// Audit contexts `<prefix><iri>` inherit readability from `<iri>`.
    #[serde(default = "default_audit_prefix")]
    pub audit_prefix: Option<String>,
    /// Namespace for user agents, `<namespace><username>`.
    #[serde(default = "default_user_namespace")]
    pub user_namespace: String,
}

fn default_system_agent() -> String {
    "warden:user:system".into()
}
fn default_anonymous_agent() -> String {
    "warden:user:anonymous".into()
}
fn default_metadata_context() -> String {
    "warden:model:metadata".into()
}
fn default_audit_prefix() -> Option<String> {
    Some("warden:audit:".into())
}
fn default_user_namespace() -> String {
    "warden:user:".into()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            system_agent: default_system_agent(),
            anonymous_agent: default_anonymous_agent(),
            metadata_context: default_metadata_context(),
            audit_prefix: default_audit_prefix(),
            user_namespace: default_user_namespace(),
        }
    }
}

impl SecurityConfig {
    /// Parse a config from TOML text. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Load a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Check every IRI and produce engine settings.
    pub fn validate(&self) -> ConfigResult<Settings> {
        let iri = |field: &str, value: &str| {
            named_node(value).map_err(|_| ConfigError::InvalidIri {
                field: field.into(),
                value: value.into(),
            })
        };
        // The namespace must produce valid IRIs once a name is appended.
        iri("user_namespace", &format!("{}x", self.user_namespace))?;
        Ok(Settings {
            system_agent: iri("system_agent", &self.system_agent)?,
            anonymous_agent: iri("anonymous_agent", &self.anonymous_agent)?,
            metadata_context: iri("metadata_context", &self.metadata_context)?,
            audit_prefix: self.audit_prefix.clone(),
            user_namespace: self.user_namespace.clone(),
        })
    }
}

/// Validated settings shared by the gate, the oracle and every batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub system_agent: Agent,
    pub anonymous_agent: Agent,
    pub metadata_context: Context,
    pub audit_prefix: Option<String>,
    pub user_namespace: String,
}

impl Default for Settings {
    fn default() -> Self {
        SecurityConfig::default()
            .validate()
            .expect("default security config is valid")
    }
}

impl Settings {
    pub fn is_system(&self, agent: &Agent) -> bool {
        *agent == self.system_agent
    }

    /// The agent IRI for a user name.
    pub fn agent_for_username(&self, username: &str) -> ConfigResult<Agent> {
        let value = format!("{}{username}", self.user_namespace);
        named_node(&value).map_err(|_| ConfigError::InvalidIri {
            field: "username".into(),
            value,
        })
    }

    /// The user name of an agent in the user namespace.
    pub fn username_for_agent<'a>(&self, agent: &'a Agent) -> Option<&'a str> {
        agent.as_str().strip_prefix(self.user_namespace.as_str())
    }

    /// For an audit context, the context whose readability it inherits.
    pub fn audited_context(&self, context: &Context) -> Option<Context> {
        let prefix = self.audit_prefix.as_deref()?;
        let audited = context.as_str().strip_prefix(prefix)?;
        named_node(audited).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let settings = SecurityConfig::default().validate().unwrap();
        assert_eq!(settings.system_agent.as_str(), "warden:user:system");
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config = SecurityConfig::from_toml_str(
            r#"
            metadata_context = "http://example.org/meta"
            audit_prefix = "http://example.org/audit/"
            "#,
        )
        .unwrap();
        assert_eq!(config.metadata_context, "http://example.org/meta");
        assert_eq!(config.system_agent, "warden:user:system");
    }

    #[test]
    fn invalid_iri_is_reported_with_field() {
        let config = SecurityConfig {
            system_agent: "no scheme".into(),
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidIri { field, .. }) => assert_eq!(field, "system_agent"),
            other => panic!("expected InvalidIri, got {other:?}"),
        }
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            SecurityConfig::from_toml_str("system_agent = "),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn usernames_round_trip() {
        let settings = Settings::default();
        let alice = settings.agent_for_username("alice").unwrap();
        assert_eq!(alice.as_str(), "warden:user:alice");
        assert_eq!(settings.username_for_agent(&alice), Some("alice"));
    }

    #[test]
    fn audit_contexts_resolve_to_their_target() {
        let settings = Settings::default();
        let audit = named_node("warden:audit:http://example.org/m1").unwrap();
        assert_eq!(
            settings.audited_context(&audit).unwrap().as_str(),
            "http://example.org/m1"
        );
        let plain = named_node("http://example.org/m1").unwrap();
        assert!(settings.audited_context(&plain).is_none());
    }
}
