//! Core data model: entities and value objects
//!
//! Entities mirror the persistence layout one to one. Value objects are the
//! closed enums used across chunking, property filtering and access control.

use crate::error::{RagError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// How a document's text is split into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    Recursive,
    Fixed,
    Semantic,
}

impl ChunkingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::Recursive => "recursive",
            ChunkingStrategy::Fixed => "fixed",
            ChunkingStrategy::Semantic => "semantic",
        }
    }
}

impl FromStr for ChunkingStrategy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "recursive" => Ok(ChunkingStrategy::Recursive),
            "fixed" => Ok(ChunkingStrategy::Fixed),
            "semantic" => Ok(ChunkingStrategy::Semantic),
            other => Err(RagError::Validation(format!(
                "unknown chunking strategy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action gated by a permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Read,
    Write,
    Delete,
    Admin,
    Migrate,
}

impl PermissionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionAction::Read => "read",
            PermissionAction::Write => "write",
            PermissionAction::Delete => "delete",
            PermissionAction::Admin => "admin",
            PermissionAction::Migrate => "migrate",
        }
    }
}

impl FromStr for PermissionAction {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(PermissionAction::Read),
            "write" => Ok(PermissionAction::Write),
            "delete" => Ok(PermissionAction::Delete),
            "admin" => Ok(PermissionAction::Admin),
            "migrate" => Ok(PermissionAction::Migrate),
            other => Err(RagError::Validation(format!("unknown action: {}", other))),
        }
    }
}

impl fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared interpretation of a property value, used for filter casts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Int,
    Float,
    Bool,
    Date,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Int => "int",
            PropertyType::Float => "float",
            PropertyType::Bool => "bool",
            PropertyType::Date => "date",
        }
    }
}

impl FromStr for PropertyType {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(PropertyType::String),
            "int" => Ok(PropertyType::Int),
            "float" => Ok(PropertyType::Float),
            "bool" => Ok(PropertyType::Bool),
            "date" => Ok(PropertyType::Date),
            other => Err(RagError::Validation(format!(
                "unknown property type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable bundle of chunking and embedding parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub id: Uuid,
    pub chunking_strategy: ChunkingStrategy,
    pub embedding_model: String,
    pub embedding_dimensions: i32,
    pub chunk_size: i32,
    pub chunk_overlap: i32,
    pub name: Option<String>,
}

/// Named set of packs pinned to one configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub configuration_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub name: Option<String>,
}

/// Original ingested text plus the content hash used for deduplication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub content: String,
    /// 16-byte MD5 of the content as ingested
    pub source_hash: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One realization of a document under one chunking strategy; owns the chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    pub id: Uuid,
    pub document_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Contiguous text fragment of a pack with its embedding and ordinal position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub pack_id: Uuid,
    pub content: String,
    pub embedding: Vec<f32>,
    /// 0-based, dense within a pack
    pub position: i32,
}

/// Typed key/value metadatum attached to a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub document_id: Uuid,
    pub key: String,
    pub value: String,
    pub property_type: PropertyType,
}

/// Named bundle of action strings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Binding of one subject to one role on one collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub subject: String,
    pub role_id: Uuid,
    /// When present, replaces the role's default action set entirely
    pub actions_override: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl Permission {
    /// Effective action set: the override when present, the role's actions otherwise
    pub fn effective_actions<'a>(&'a self, role_actions: &'a [String]) -> &'a [String] {
        match &self.actions_override {
            Some(actions) => actions,
            None => role_actions,
        }
    }

    pub fn allows(&self, role_actions: &[String], action: PermissionAction) -> bool {
        self.effective_actions(role_actions)
            .iter()
            .any(|a| a == action.as_str())
    }
}

/// One property-filter predicate applied to search
#[derive(Debug, Clone, PartialEq)]
pub enum SearchFilter {
    /// Equality on the stored string form
    Eq(String),
    /// Set membership; an empty list never reaches this variant
    OneOf(Vec<String>),
    /// Inclusive range; endpoints cast to numeric, falling back to date
    Range {
        gte: Option<String>,
        lte: Option<String>,
    },
}

impl SearchFilter {
    /// Parse one filter spec from its JSON form.
    ///
    /// A bare primitive is shorthand for `{eq: value}`. Unrecognized or
    /// malformed specs yield `None` and are ignored by the caller; an empty
    /// `one_of` list likewise disables the filter.
    pub fn from_value(spec: &Value) -> Option<SearchFilter> {
        if let Some(s) = stringify_scalar(spec) {
            return Some(SearchFilter::Eq(s));
        }
        let map = spec.as_object()?;
        if let Some(one_of) = map.get("one_of") {
            let values: Vec<String> = one_of
                .as_array()?
                .iter()
                .filter_map(stringify_scalar)
                .collect();
            if values.is_empty() {
                return None;
            }
            return Some(SearchFilter::OneOf(values));
        }
        if map.contains_key("gte") || map.contains_key("lte") {
            let gte = map.get("gte").and_then(stringify_scalar);
            let lte = map.get("lte").and_then(stringify_scalar);
            if gte.is_none() && lte.is_none() {
                return None;
            }
            return Some(SearchFilter::Range { gte, lte });
        }
        if let Some(eq) = map.get("eq") {
            return stringify_scalar(eq).map(SearchFilter::Eq);
        }
        None
    }

    /// Parse a filters map, dropping entries that do not form a valid spec
    pub fn parse_map(filters: &serde_json::Map<String, Value>) -> Vec<(String, SearchFilter)> {
        filters
            .iter()
            .filter_map(|(key, spec)| {
                SearchFilter::from_value(spec).map(|f| (key.clone(), f))
            })
            .collect()
    }
}

/// Stored string form of a scalar JSON value; booleans become "true"/"false"
pub fn stringify_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "true" } else { "false" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strategy_round_trip() {
        for s in ["recursive", "fixed", "semantic"] {
            let parsed: ChunkingStrategy = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!("sliding".parse::<ChunkingStrategy>().is_err());
    }

    #[test]
    fn test_action_round_trip() {
        for a in ["read", "write", "delete", "admin", "migrate"] {
            let parsed: PermissionAction = a.parse().unwrap();
            assert_eq!(parsed.as_str(), a);
        }
        assert!("own".parse::<PermissionAction>().is_err());
    }

    #[test]
    fn test_property_type_round_trip() {
        for t in ["string", "int", "float", "bool", "date"] {
            let parsed: PropertyType = t.parse().unwrap();
            assert_eq!(parsed.as_str(), t);
        }
    }

    fn permission(actions_override: Option<Vec<String>>) -> Permission {
        Permission {
            id: Uuid::new_v4(),
            collection_id: Uuid::new_v4(),
            subject: "user-1".to_string(),
            role_id: Uuid::new_v4(),
            actions_override,
            created_at: Utc::now(),
            created_by: None,
        }
    }

    #[test]
    fn test_effective_actions_prefer_override() {
        let role_actions = vec!["read".to_string(), "write".to_string()];

        let plain = permission(None);
        assert!(plain.allows(&role_actions, PermissionAction::Write));
        assert!(!plain.allows(&role_actions, PermissionAction::Admin));

        let overridden = permission(Some(vec!["read".to_string()]));
        assert!(overridden.allows(&role_actions, PermissionAction::Read));
        assert!(!overridden.allows(&role_actions, PermissionAction::Write));
    }

    #[test]
    fn test_empty_override_denies_everything() {
        let role_actions = vec!["read".to_string()];
        let locked = permission(Some(vec![]));
        assert!(!locked.allows(&role_actions, PermissionAction::Read));
    }

    #[test]
    fn test_filter_bare_primitives() {
        assert_eq!(
            SearchFilter::from_value(&json!("open")),
            Some(SearchFilter::Eq("open".to_string()))
        );
        assert_eq!(
            SearchFilter::from_value(&json!(true)),
            Some(SearchFilter::Eq("true".to_string()))
        );
        assert_eq!(
            SearchFilter::from_value(&json!(42)),
            Some(SearchFilter::Eq("42".to_string()))
        );
    }

    #[test]
    fn test_filter_eq_spec() {
        assert_eq!(
            SearchFilter::from_value(&json!({"eq": false})),
            Some(SearchFilter::Eq("false".to_string()))
        );
    }

    #[test]
    fn test_filter_one_of() {
        assert_eq!(
            SearchFilter::from_value(&json!({"one_of": ["a", "b"]})),
            Some(SearchFilter::OneOf(vec!["a".to_string(), "b".to_string()]))
        );
        // empty list disables the filter
        assert_eq!(SearchFilter::from_value(&json!({"one_of": []})), None);
    }

    #[test]
    fn test_filter_range() {
        assert_eq!(
            SearchFilter::from_value(&json!({"gte": 1, "lte": 10})),
            Some(SearchFilter::Range {
                gte: Some("1".to_string()),
                lte: Some("10".to_string()),
            })
        );
        assert_eq!(
            SearchFilter::from_value(&json!({"gte": "2024-01-01"})),
            Some(SearchFilter::Range {
                gte: Some("2024-01-01".to_string()),
                lte: None,
            })
        );
    }

    #[test]
    fn test_filter_unrecognized_specs_ignored() {
        assert_eq!(SearchFilter::from_value(&json!({"like": "%x%"})), None);
        assert_eq!(SearchFilter::from_value(&json!(null)), None);
        assert_eq!(SearchFilter::from_value(&json!([1, 2])), None);
    }

    #[test]
    fn test_parse_map_drops_invalid_entries() {
        let filters = json!({
            "status": {"eq": "open"},
            "broken": {"unknown": 1},
            "tags": {"one_of": []}
        });
        let parsed = SearchFilter::parse_map(filters.as_object().unwrap());
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0, "status");
    }
}
