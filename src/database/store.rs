use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use super::object_id::ObjectId;

/// Longest collection name accepted (PostgreSQL identifier limit)
const MAX_COLLECTION_NAME: usize = 63;

/// Errors raised by a document store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("duplicate key: {0}")]
    Duplicate(ObjectId),

    #[error("invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("invalid search pattern: {0}")]
    InvalidPattern(String),

    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

/// Prefix match on a single top-level field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCondition {
    pub field: String,
    /// Regular expression anchored at the start of the field value
    pub pattern: String,
}

/// Conjunction of prefix conditions. An empty query matches every document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    conditions: Vec<SearchCondition>,
}

impl SearchQuery {
    pub fn all() -> Self {
        Self::default()
    }

    /// Add a condition: `field` must match the regular expression `^prefix`
    pub fn prefix(mut self, field: impl Into<String>, prefix: &str) -> Self {
        self.conditions.push(SearchCondition {
            field: field.into(),
            pattern: format!("^{}", prefix),
        });
        self
    }

    /// Build from a search request body: an object mapping field names to prefixes
    pub fn from_request(body: &Map<String, Value>) -> Result<Self, String> {
        let mut query = Self::all();
        for (field, value) in body {
            match value {
                Value::String(prefix) => query = query.prefix(field.clone(), prefix),
                other => {
                    return Err(format!(
                        "search value for '{}' must be a string, got {}",
                        field, other
                    ))
                }
            }
        }
        Ok(query)
    }

    pub fn conditions(&self) -> &[SearchCondition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Schemaless store of JSON documents grouped into named collections
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch one document by id
    async fn find_id(&self, collection: &str, id: &ObjectId) -> Result<Value, StoreError>;

    /// All documents matching the query, ordered by id
    async fn find(&self, collection: &str, query: &SearchQuery) -> Result<Vec<Value>, StoreError>;

    async fn insert(&self, collection: &str, id: &ObjectId, doc: Value) -> Result<(), StoreError>;

    /// Replace an existing document
    async fn update_id(&self, collection: &str, id: &ObjectId, doc: Value) -> Result<(), StoreError>;

    async fn remove_id(&self, collection: &str, id: &ObjectId) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Validate collection names before they reach a backend. Accepts
/// `[A-Za-z_][A-Za-z0-9_]*` up to 63 characters.
pub fn validate_collection_name(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_start && valid_rest && name.len() <= MAX_COLLECTION_NAME {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}

/// Render a top-level field the way the search compares it: strings as-is,
/// scalars in their JSON form, missing / null / nested values never match.
pub fn field_as_text(doc: &Value, field: &str) -> Option<String> {
    match doc.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
