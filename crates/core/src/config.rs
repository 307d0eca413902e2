use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::ids::{RecordId, ROOT_ID};

const DEFAULT_KEY_FIELD: &str = "id";
const KEY_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeConfig {
    pub keys: Vec<String>,
}

/// Cache-wide settings: the root sentinel and how entity identity is derived.
///
/// ```toml
/// root_id = "_ROOT_"
/// default_keys = ["id"]
///
/// [types.Repository]
/// keys = ["owner", "name"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub root_id: String,
    pub default_keys: Vec<String>,
    pub types: BTreeMap<String, TypeConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_id: ROOT_ID.to_string(),
            default_keys: vec![DEFAULT_KEY_FIELD.to_string()],
            types: BTreeMap::new(),
        }
    }
}

impl CacheConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, CoreError> {
        let config: CacheConfig =
            toml::from_str(source).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_type_keys(mut self, type_name: &str, keys: &[&str]) -> Self {
        self.types.insert(
            type_name.to_string(),
            TypeConfig {
                keys: keys.iter().map(|k| k.to_string()).collect(),
            },
        );
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.root_id.is_empty() {
            return Err(CoreError::InvalidConfig("root_id must not be empty".into()));
        }
        if self.default_keys.is_empty() {
            return Err(CoreError::InvalidConfig("default_keys must not be empty".into()));
        }
        for (type_name, type_config) in &self.types {
            if type_config.keys.is_empty() {
                return Err(CoreError::InvalidConfig(format!(
                    "type {type_name} must declare at least one key"
                )));
            }
        }
        Ok(())
    }

    pub fn root_id(&self) -> RecordId {
        RecordId::new(self.root_id.clone())
    }

    pub fn key_fields(&self, type_name: &str) -> &[String] {
        self.types
            .get(type_name)
            .map(|t| t.keys.as_slice())
            .unwrap_or(&self.default_keys)
    }

    /// True when `data` carries every key field of `type_name`.
    pub fn is_identifiable(&self, type_name: &str, data: &serde_json::Map<String, Value>) -> bool {
        self.key_fields(type_name)
            .iter()
            .all(|key| data.get(key).and_then(id_fragment).is_some())
    }

    /// Compute a record id from an object carrying the type's key fields, or
    /// from a bare id value.
    pub fn compute_id(&self, type_name: &str, data: &Value) -> Result<RecordId, CoreError> {
        match data {
            Value::Object(fields) => {
                let mut parts = Vec::new();
                for key in self.key_fields(type_name) {
                    let part = fields
                        .get(key)
                        .and_then(id_fragment)
                        .ok_or_else(|| CoreError::MissingKeyField {
                            type_name: type_name.to_string(),
                            field: key.clone(),
                        })?;
                    parts.push(part);
                }
                Ok(RecordId::entity(type_name, &parts.join(KEY_SEPARATOR)))
            }
            other => id_fragment(other)
                .map(|part| RecordId::entity(type_name, &part))
                .ok_or_else(|| CoreError::InvalidIdValue {
                    type_name: type_name.to_string(),
                    value: other.to_string(),
                }),
        }
    }
}

fn id_fragment(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_identity() {
        let config = CacheConfig::default();
        let id = config.compute_id("User", &json!({"id": "1", "firstName": "bob"})).unwrap();
        assert_eq!(id.as_str(), "User:1");
        assert_eq!(config.compute_id("User", &json!(7)).unwrap().as_str(), "User:7");
    }

    #[test]
    fn missing_key_field() {
        let config = CacheConfig::default();
        assert!(matches!(
            config.compute_id("User", &json!({"name": "bob"})),
            Err(CoreError::MissingKeyField { .. })
        ));
        assert!(config.compute_id("User", &json!(null)).is_err());
    }

    #[test]
    fn loads_type_keys_from_toml() {
        let config = CacheConfig::from_toml_str(
            r#"
            [types.Repository]
            keys = ["owner", "name"]
            "#,
        )
        .unwrap();
        assert_eq!(config.root_id, ROOT_ID);
        let id = config
            .compute_id("Repository", &json!({"owner": "alice", "name": "cache"}))
            .unwrap();
        assert_eq!(id.as_str(), "Repository:alice__cache");
        assert!(!config.is_identifiable("Repository", json!({"owner": "alice"}).as_object().unwrap()));
    }

    #[test]
    fn rejects_empty_keys() {
        assert!(CacheConfig::from_toml_str("default_keys = []").is_err());
        assert!(CacheConfig::from_toml_str("[types.User]\nkeys = []").is_err());
    }
}
