use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::object_id::ObjectId;
use super::store::{field_as_text, validate_collection_name, DocumentStore, SearchQuery, StoreError};

type Collection = BTreeMap<ObjectId, Value>;

/// In-process document store. Collections spring into existence on first write.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection (0 when it does not exist)
    pub async fn count(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map_or(0, BTreeMap::len)
    }
}

fn compile(query: &SearchQuery) -> Result<Vec<(String, Regex)>, StoreError> {
    query
        .conditions()
        .iter()
        .map(|c| {
            Regex::new(&c.pattern)
                .map(|re| (c.field.clone(), re))
                .map_err(|e| StoreError::InvalidPattern(e.to_string()))
        })
        .collect()
}

fn ensure_object(doc: &Value) -> Result<(), StoreError> {
    if doc.is_object() {
        Ok(())
    } else {
        Err(StoreError::NotAnObject)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find_id(&self, collection: &str, id: &ObjectId) -> Result<Value, StoreError> {
        validate_collection_name(collection)?;
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find(&self, collection: &str, query: &SearchQuery) -> Result<Vec<Value>, StoreError> {
        validate_collection_name(collection)?;
        let matchers = compile(query)?;

        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(docs
            .values()
            .filter(|doc| {
                matchers.iter().all(|(field, re)| {
                    field_as_text(doc, field).is_some_and(|text| re.is_match(&text))
                })
            })
            .cloned()
            .collect())
    }

    async fn insert(&self, collection: &str, id: &ObjectId, doc: Value) -> Result<(), StoreError> {
        validate_collection_name(collection)?;
        ensure_object(&doc)?;

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(StoreError::Duplicate(*id));
        }
        docs.insert(*id, doc);
        Ok(())
    }

    async fn update_id(&self, collection: &str, id: &ObjectId, doc: Value) -> Result<(), StoreError> {
        validate_collection_name(collection)?;
        ensure_object(&doc)?;

        let mut collections = self.collections.write().await;
        let slot = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or(StoreError::NotFound)?;
        *slot = doc;
        Ok(())
    }

    async fn remove_id(&self, collection: &str, id: &ObjectId) -> Result<(), StoreError> {
        validate_collection_name(collection)?;
        let mut collections = self.collections.write().await;
        collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_then_find_by_id() {
        let store = MemoryDocumentStore::new();
        let id = ObjectId::new();
        store.insert("projects", &id, json!({ "name": "a" })).await.unwrap();

        let doc = store.find_id("projects", &id).await.unwrap();
        assert_eq!(doc["name"], "a");
        assert_eq!(store.count("projects").await, 1);
    }

    #[tokio::test]
    async fn missing_documents_are_not_found() {
        let store = MemoryDocumentStore::new();
        let id = ObjectId::new();
        assert!(matches!(store.find_id("projects", &id).await, Err(StoreError::NotFound)));
        assert!(matches!(store.remove_id("projects", &id).await, Err(StoreError::NotFound)));
        assert!(matches!(
            store.update_id("projects", &id, json!({})).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = MemoryDocumentStore::new();
        let id = ObjectId::new();
        store.insert("projects", &id, json!({})).await.unwrap();
        let err = store.insert("projects", &id, json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(dup) if dup == id));
    }

    #[tokio::test]
    async fn rejects_non_object_documents() {
        let store = MemoryDocumentStore::new();
        let err = store.insert("projects", &ObjectId::new(), json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject));
    }

    #[tokio::test]
    async fn rejects_invalid_collection_names() {
        let store = MemoryDocumentStore::new();
        let err = store.find("bad name", &SearchQuery::all()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidCollection(_)));
    }

    #[tokio::test]
    async fn find_lists_in_id_order() {
        let store = MemoryDocumentStore::new();
        let ids: Vec<ObjectId> = (0..3).map(|_| ObjectId::new()).collect();
        for (i, id) in ids.iter().enumerate().rev() {
            store.insert("projects", id, json!({ "n": i })).await.unwrap();
        }

        let docs = store.find("projects", &SearchQuery::all()).await.unwrap();
        let order: Vec<_> = docs.iter().map(|d| d["n"].as_u64().unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn prefix_search_requires_every_condition() {
        let store = MemoryDocumentStore::new();
        store
            .insert("projects", &ObjectId::new(), json!({ "name": "Alpaca", "category": "web" }))
            .await
            .unwrap();
        store
            .insert("projects", &ObjectId::new(), json!({ "name": "Alpine", "category": "cli" }))
            .await
            .unwrap();
        store
            .insert("projects", &ObjectId::new(), json!({ "name": "Llama", "category": "web" }))
            .await
            .unwrap();

        let hits = store.find("projects", &SearchQuery::all().prefix("name", "Alp")).await.unwrap();
        assert_eq!(hits.len(), 2);

        let hits = store
            .find("projects", &SearchQuery::all().prefix("name", "Alp").prefix("category", "web"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["name"], "Alpaca");

        // Anchored: a match in the middle of the value does not count
        let hits = store.find("projects", &SearchQuery::all().prefix("name", "paca")).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn search_values_are_regular_expressions() {
        let store = MemoryDocumentStore::new();
        store.insert("projects", &ObjectId::new(), json!({ "name": "Alpaca" })).await.unwrap();

        let hits = store.find("projects", &SearchQuery::all().prefix("name", "A.p")).await.unwrap();
        assert_eq!(hits.len(), 1);

        let err = store.find("projects", &SearchQuery::all().prefix("name", "(")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPattern(_)));
    }
}
