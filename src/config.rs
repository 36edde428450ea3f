//! Verifier configuration.
//!
//! [`VerifierSettings`] describe one deployment (scope, endpoint, accepted
//! documents) and are loaded once. [`VerificationConfig`] is the per-action
//! policy a [`ConfigStore`] resolves from the user context of each request.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::identifier::UserIdType;
use crate::AttestationType;

/// Action id returned by [`StaticConfigStore`].
pub const DEFAULT_ACTION_ID: &str = "random-id";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Config store lock poisoned")]
    LockPoisoned,

    #[error("Config store error: {0}")]
    Store(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Disclosure policy applied to a proof.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerificationConfig {
    /// Required minimum age; 0 disables the check.
    #[serde(skip_serializing_if = "is_zero")]
    pub minimum_age: u32,
    /// ISO 3166-1 alpha-3 codes the circuit must have excluded.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded_countries: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ofac: bool,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl VerificationConfig {
    /// A config with no requirement at all counts as missing.
    pub fn is_empty(&self) -> bool {
        self.minimum_age == 0 && self.excluded_countries.is_empty() && !self.ofac
    }
}

/// Source of per-action verification policies.
pub trait ConfigStore: Send + Sync {
    /// Config stored under `id`; an empty config when none is.
    fn get_config(&self, id: &str) -> ConfigResult<VerificationConfig>;

    /// Store `config` under `id`. Returns `true` if `id` was new.
    fn set_config(&self, id: &str, config: VerificationConfig) -> ConfigResult<bool>;

    /// Resolve the config id for a request.
    fn get_action_id(&self, user_identifier: &str, user_defined_data: &str)
        -> ConfigResult<String>;
}

/// One config for every request.
#[derive(Debug, Default)]
pub struct StaticConfigStore {
    config: RwLock<VerificationConfig>,
}

impl StaticConfigStore {
    pub fn new(config: VerificationConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }
}

impl ConfigStore for StaticConfigStore {
    fn get_config(&self, _id: &str) -> ConfigResult<VerificationConfig> {
        Ok(self
            .config
            .read()
            .map_err(|_| ConfigError::LockPoisoned)?
            .clone())
    }

    fn set_config(&self, _id: &str, config: VerificationConfig) -> ConfigResult<bool> {
        *self.config.write().map_err(|_| ConfigError::LockPoisoned)? = config;
        Ok(true)
    }

    fn get_action_id(&self, _user_identifier: &str, _user_defined_data: &str) -> ConfigResult<String> {
        Ok(DEFAULT_ACTION_ID.to_string())
    }
}

type ActionIdFn = dyn Fn(&str, &str) -> ConfigResult<String> + Send + Sync;

/// Configs keyed by id, with a caller-supplied action id resolver.
pub struct InMemoryConfigStore {
    configs: RwLock<HashMap<String, VerificationConfig>>,
    action_id: Box<ActionIdFn>,
}

impl InMemoryConfigStore {
    pub fn new<F>(action_id: F) -> Self
    where
        F: Fn(&str, &str) -> ConfigResult<String> + Send + Sync + 'static,
    {
        Self {
            configs: RwLock::new(HashMap::new()),
            action_id: Box::new(action_id),
        }
    }

    pub fn len(&self) -> usize {
        self.configs.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for InMemoryConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryConfigStore")
            .field("configs", &self.len())
            .finish_non_exhaustive()
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn get_config(&self, id: &str) -> ConfigResult<VerificationConfig> {
        let configs = self.configs.read().map_err(|_| ConfigError::LockPoisoned)?;
        Ok(configs.get(id).cloned().unwrap_or_default())
    }

    fn set_config(&self, id: &str, config: VerificationConfig) -> ConfigResult<bool> {
        let mut configs = self.configs.write().map_err(|_| ConfigError::LockPoisoned)?;
        Ok(configs.insert(id.to_string(), config).is_none())
    }

    fn get_action_id(&self, user_identifier: &str, user_defined_data: &str) -> ConfigResult<String> {
        (self.action_id)(user_identifier, user_defined_data)
    }
}

/// Deployment settings of a verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierSettings {
    /// Application scope string.
    pub scope: String,
    /// Endpoint URL the scope is bound to.
    pub endpoint: String,
    /// Accepted document families; all by default.
    #[serde(default = "all_attestation_types")]
    pub allowed_ids: Vec<AttestationType>,
    #[serde(default)]
    pub user_identifier_type: UserIdType,
    /// Expected watch-list roots, decimal. Unchecked when absent.
    #[serde(default)]
    pub name_dob_root: Option<String>,
    #[serde(default)]
    pub name_yob_root: Option<String>,
}

fn all_attestation_types() -> Vec<AttestationType> {
    AttestationType::ALL.to_vec()
}

impl VerifierSettings {
    pub fn new(scope: &str, endpoint: &str) -> Self {
        Self {
            scope: scope.to_string(),
            endpoint: endpoint.to_string(),
            allowed_ids: all_attestation_types(),
            user_identifier_type: UserIdType::default(),
            name_dob_root: None,
            name_yob_root: None,
        }
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let settings: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.scope.is_empty() {
            return Err(ConfigError::Invalid("scope must not be empty".into()));
        }
        if self.endpoint.is_empty() {
            return Err(ConfigError::Invalid("endpoint must not be empty".into()));
        }
        Ok(())
    }

    pub fn is_allowed(&self, attestation: AttestationType) -> bool {
        self.allowed_ids.contains(&attestation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_config_json() {
        let config: VerificationConfig =
            serde_json::from_str(r#"{"minimumAge": 18, "excludedCountries": ["PRK"], "ofac": true}"#)
                .unwrap();
        assert_eq!(config.minimum_age, 18);
        assert_eq!(config.excluded_countries, vec!["PRK"]);
        assert!(config.ofac);

        let empty: VerificationConfig = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
        assert_eq!(serde_json::to_string(&empty).unwrap(), "{}");
    }

    #[test]
    fn test_static_store() {
        let store = StaticConfigStore::new(VerificationConfig {
            minimum_age: 21,
            ..Default::default()
        });
        assert_eq!(store.get_action_id("user", "").unwrap(), DEFAULT_ACTION_ID);
        assert_eq!(store.get_config("anything").unwrap().minimum_age, 21);
        assert!(store.set_config("x", VerificationConfig::default()).unwrap());
        assert!(store.get_config("x").unwrap().is_empty());
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryConfigStore::new(|user, data| Ok(format!("{user}:{data}")));
        let config = VerificationConfig {
            ofac: true,
            ..Default::default()
        };

        assert!(store.set_config("a", config.clone()).unwrap());
        assert!(!store.set_config("a", config.clone()).unwrap());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_config("a").unwrap(), config);
        assert!(store.get_config("missing").unwrap().is_empty());
        assert_eq!(store.get_action_id("u", "d").unwrap(), "u:d");
    }

    #[test]
    fn test_settings_from_json() {
        let settings = VerifierSettings::from_json(
            r#"{"scope": "self-playground", "endpoint": "https://playground.self.xyz/api/verify",
                "allowedIds": [1, 2], "userIdentifierType": "uuid"}"#,
        )
        .unwrap();
        assert!(settings.is_allowed(AttestationType::Passport));
        assert!(!settings.is_allowed(AttestationType::Aadhaar));
        assert_eq!(settings.user_identifier_type, UserIdType::Uuid);
        assert_eq!(settings.name_dob_root, None);

        let defaults =
            VerifierSettings::from_json(r#"{"scope": "s", "endpoint": "https://e.com"}"#).unwrap();
        assert_eq!(defaults.allowed_ids.len(), 3);
        assert_eq!(defaults.user_identifier_type, UserIdType::Hex);
    }

    #[test]
    fn test_settings_rejects_bad_input() {
        assert!(matches!(
            VerifierSettings::from_json(r#"{"scope": "", "endpoint": "https://e.com"}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            VerifierSettings::from_json(r#"{"scope": "s", "endpoint": "e", "allowedIds": [7]}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            VerifierSettings::from_file(Path::new("/nonexistent/settings.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"scope": "s", "endpoint": "https://e.com"}"#).unwrap();
        assert_eq!(VerifierSettings::from_file(&path).unwrap().scope, "s");
    }
}
