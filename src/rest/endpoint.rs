use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, OriginalUri, Path, State},
    http::{StatusCode, Uri},
    routing::{delete, get, post, put, MethodRouter},
    Json, Router,
};
use serde_json::Value;
use tracing::{error, info, warn};

use super::{make_path, Document, REQUIRED_FIELDS_MISSING};
use crate::database::manager::{Collection, SharedStore};
use crate::database::object_id::ObjectId;
use crate::database::store::{SearchQuery, StoreError};
use crate::error::ApiError;

/// Path segment of the search endpoint
const SEARCH_SEGMENT: &str = "_search";

/// Binds document collections to REST endpoints under a common prefix.
///
/// ```ignore
/// let router = RecordEndpointMaker::new("api", store)
///     .make_crud::<Project>("projects")?
///     .into_router();
/// ```
pub struct RecordEndpointMaker {
    prefix: String,
    router: Router,
    store: SharedStore,
}

impl RecordEndpointMaker {
    pub fn new(prefix: impl Into<String>, store: SharedStore) -> Self {
        Self::with_router(prefix, Router::new(), store)
    }

    /// Continue building on an existing router
    pub fn with_router(prefix: impl Into<String>, router: Router, store: SharedStore) -> Self {
        Self {
            prefix: prefix.into(),
            router,
            store,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    fn collection(&self, record: &str) -> Result<Collection, StoreError> {
        Collection::new(self.store.clone(), record)
    }

    fn route(mut self, path: &str, method_router: MethodRouter) -> Self {
        info!("Registered {}", path);
        self.router = self.router.route(path, method_router);
        self
    }

    /// GET /{prefix}/{record}/:id
    pub fn make_get_endpoint<D: Document>(self, record: &str) -> Result<Self, StoreError> {
        let collection = self.collection(record)?;
        let path = make_path(&self.prefix, record, &[":id"]);
        Ok(self.route(&path, get(get_record::<D>).with_state(collection)))
    }

    /// GET /{prefix}/{record}
    pub fn make_list_endpoint<D: Document>(self, record: &str) -> Result<Self, StoreError> {
        let collection = self.collection(record)?;
        let path = make_path(&self.prefix, record, &[]);
        Ok(self.route(&path, get(list_records::<D>).with_state(collection)))
    }

    /// POST /{prefix}/{record}
    pub fn make_create_endpoint<D: Document>(self, record: &str) -> Result<Self, StoreError> {
        let collection = self.collection(record)?;
        let path = make_path(&self.prefix, record, &[]);
        Ok(self.route(&path, post(create_record::<D>).with_state(collection)))
    }

    /// DELETE /{prefix}/{record}/:id
    pub fn make_remove_endpoint(self, record: &str) -> Result<Self, StoreError> {
        let collection = self.collection(record)?;
        let path = make_path(&self.prefix, record, &[":id"]);
        Ok(self.route(&path, delete(remove_record).with_state(collection)))
    }

    /// PUT /{prefix}/{record}/:id
    pub fn make_update_endpoint<D: Document>(self, record: &str) -> Result<Self, StoreError> {
        let collection = self.collection(record)?;
        let path = make_path(&self.prefix, record, &[":id"]);
        Ok(self.route(&path, put(update_record::<D>).with_state(collection)))
    }

    /// POST /{prefix}/{record}/_search
    pub fn make_search_endpoint<D: Document>(self, record: &str) -> Result<Self, StoreError> {
        let collection = self.collection(record)?;
        let path = make_path(&self.prefix, record, &[SEARCH_SEGMENT]);
        Ok(self.route(&path, post(search_records::<D>).with_state(collection)))
    }

    /// All six endpoints for one collection
    pub fn make_crud<D: Document>(self, record: &str) -> Result<Self, StoreError> {
        self.make_get_endpoint::<D>(record)?
            .make_list_endpoint::<D>(record)?
            .make_create_endpoint::<D>(record)?
            .make_update_endpoint::<D>(record)?
            .make_remove_endpoint(record)?
            .make_search_endpoint::<D>(record)
    }
}

/// Log a failed request; client errors at warn, the rest at error
fn logged<T>(method: &str, uri: &Uri, result: Result<T, ApiError>) -> Result<T, ApiError> {
    if let Err(err) = &result {
        if err.status_code().is_server_error() {
            error!("Error {} {}: {}", method, uri, err);
        } else {
            warn!("Error {} {}: {}", method, uri, err);
        }
    }
    result
}

/// Ids outside `[0-9a-f]{24}` never match a record route
fn parse_id(uri: &Uri, raw: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw).map_err(|_| ApiError::not_found(format!("no route for {}", uri.path())))
}

fn read_body(body: Result<Bytes, BytesRejection>) -> Result<Bytes, ApiError> {
    body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::payload_too_large(rejection.body_text())
        } else {
            ApiError::bad_request(rejection.body_text())
        }
    })
}

/// Decode a stored document; a mismatch is a server-side fault, not a client one
fn decode_stored<D: Document>(doc: Value) -> Result<D, ApiError> {
    serde_json::from_value(doc)
        .map_err(|e| ApiError::internal_server_error(format!("stored document does not decode: {}", e)))
}

fn encode<D: Document>(record: &D) -> Result<Value, ApiError> {
    serde_json::to_value(record).map_err(|e| StoreError::Serialization(e).into())
}

async fn get_record<D: Document>(
    State(collection): State<Collection>,
    Path(id): Path<String>,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<D>, ApiError> {
    info!("GET {}", uri);

    let result = async {
        let id = parse_id(&uri, &id)?;
        let doc = collection.find_id(&id).await?;
        Ok::<_, ApiError>(Json(decode_stored(doc)?))
    }
    .await;

    logged("GET", &uri, result)
}

async fn list_records<D: Document>(
    State(collection): State<Collection>,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<Vec<D>>, ApiError> {
    info!("GET {}", uri);

    let result = async {
        let docs = collection.find(&SearchQuery::all()).await?;
        let records = docs.into_iter().map(decode_stored).collect::<Result<Vec<D>, _>>()?;
        Ok::<_, ApiError>(Json(records))
    }
    .await;

    logged("GET", &uri, result)
}

async fn create_record<D: Document>(
    State(collection): State<Collection>,
    OriginalUri(uri): OriginalUri,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<D>, ApiError> {
    info!("POST {}", uri);

    let result = async {
        let body = read_body(body)?;
        let Value::Object(fields) = serde_json::from_slice::<Value>(&body)? else {
            return Err(ApiError::invalid_json("request body must be a JSON object"));
        };
        let mut record: D = serde_json::from_value(Value::Object(fields))?;

        if !record.is_valid() {
            return Err(ApiError::validation_error(REQUIRED_FIELDS_MISSING));
        }

        record.build_for_insertion();
        let id = record
            .doc_id()
            .ok_or_else(|| ApiError::internal_server_error("document has no id after insertion preparation"))?;

        collection.insert(&id, encode(&record)?).await?;
        Ok::<_, ApiError>(Json(record))
    }
    .await;

    logged("POST", &uri, result)
}

async fn remove_record(
    State(collection): State<Collection>,
    Path(id): Path<String>,
    OriginalUri(uri): OriginalUri,
) -> Result<StatusCode, ApiError> {
    info!("DELETE {}", uri);

    let result = async {
        let id = parse_id(&uri, &id)?;
        collection.remove_id(&id).await?;
        Ok::<_, ApiError>(StatusCode::OK)
    }
    .await;

    logged("DELETE", &uri, result)
}

async fn update_record<D: Document>(
    State(collection): State<Collection>,
    Path(id): Path<String>,
    OriginalUri(uri): OriginalUri,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<D>, ApiError> {
    info!("PUT {}", uri);

    let result = async {
        let id = parse_id(&uri, &id)?;
        let body = read_body(body)?;

        let stored = collection.find_id(&id).await?;
        // Undecodable stored documents are a 500, as on GET
        decode_stored::<D>(stored.clone())?;
        let Value::Object(mut merged) = stored else {
            return Err(ApiError::internal_server_error("stored document is not an object"));
        };

        let Value::Object(changes) = serde_json::from_slice::<Value>(&body)? else {
            return Err(ApiError::invalid_json("request body must be a JSON object"));
        };

        // Shallow merge; the path id is authoritative
        for (field, value) in changes {
            if field != D::ID_FIELD {
                merged.insert(field, value);
            }
        }

        let mut record: D = serde_json::from_value(Value::Object(merged))?;
        record.assign_id(id);

        if !record.is_valid() {
            return Err(ApiError::validation_error(REQUIRED_FIELDS_MISSING));
        }

        collection.update_id(&id, encode(&record)?).await?;
        Ok::<_, ApiError>(Json(record))
    }
    .await;

    logged("PUT", &uri, result)
}

async fn search_records<D: Document>(
    State(collection): State<Collection>,
    OriginalUri(uri): OriginalUri,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Vec<D>>, ApiError> {
    info!("POST {}", uri);

    let result = async {
        let body = read_body(body)?;
        let Value::Object(request) = serde_json::from_slice::<Value>(&body)? else {
            return Err(ApiError::invalid_json("search body must be a JSON object"));
        };

        let query = SearchQuery::from_request(&request).map_err(ApiError::bad_request)?;
        let docs = collection.find(&query).await?;
        let records = docs.into_iter().map(decode_stored).collect::<Result<Vec<D>, _>>()?;
        Ok::<_, ApiError>(Json(records))
    }
    .await;

    logged("POST", &uri, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryDocumentStore;
    use crate::database::store::DocumentStore;
    use axum::{body::Body, http::Request};
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct Note {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<ObjectId>,
        title: String,
    }

    impl Document for Note {
        fn doc_id(&self) -> Option<ObjectId> {
            self.id
        }

        fn assign_id(&mut self, id: ObjectId) {
            self.id = Some(id);
        }

        fn is_valid(&self) -> bool {
            !self.title.is_empty()
        }
    }

    fn notes_router(store: SharedStore) -> Router {
        RecordEndpointMaker::new("v1", store)
            .make_crud::<Note>("notes")
            .unwrap()
            .into_router()
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[test]
    fn rejects_invalid_collection_name() {
        let store: SharedStore = Arc::new(MemoryDocumentStore::new());
        let result = RecordEndpointMaker::new("v1", store).make_list_endpoint::<Note>("not valid");
        assert!(matches!(result, Err(StoreError::InvalidCollection(_))));
    }

    #[tokio::test]
    async fn create_assigns_id_and_stores() {
        let store = Arc::new(MemoryDocumentStore::new());
        let router = notes_router(store.clone());

        let (status, body) = send(&router, "POST", "/v1/notes", Some(json!({ "title": "hello" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "hello");
        let id = body["id"].as_str().unwrap();
        assert!(ObjectId::parse_str(id).is_ok());
        assert_eq!(store.count("notes").await, 1);
    }

    #[tokio::test]
    async fn client_supplied_id_is_replaced_on_create() {
        let router = notes_router(Arc::new(MemoryDocumentStore::new()));
        let supplied = "5a1b2c3d4e5f60718293a4b5";

        let (status, body) =
            send(&router, "POST", "/v1/notes", Some(json!({ "id": supplied, "title": "x" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(body["id"], supplied);
    }

    #[tokio::test]
    async fn invalid_document_is_rejected() {
        let store = Arc::new(MemoryDocumentStore::new());
        let router = notes_router(store.clone());

        let (status, body) = send(&router, "POST", "/v1/notes", Some(json!({ "title": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": REQUIRED_FIELDS_MISSING }));
        assert_eq!(store.count("notes").await, 0);
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let router = notes_router(Arc::new(MemoryDocumentStore::new()));
        let request = Request::builder()
            .method("POST")
            .uri("/v1/notes")
            .header("content-type", "application/json")
            .body(Body::from("{ not json"))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_update_remove_round() {
        let router = notes_router(Arc::new(MemoryDocumentStore::new()));
        let (_, created) = send(&router, "POST", "/v1/notes", Some(json!({ "title": "a" }))).await;
        let id = created["id"].as_str().unwrap().to_string();
        let path = format!("/v1/notes/{}", id);

        let (status, fetched) = send(&router, "GET", &path, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, created);

        let (status, updated) = send(&router, "PUT", &path, Some(json!({ "title": "b" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "b");
        assert_eq!(updated["id"], id.as_str());

        let (status, body) = send(&router, "DELETE", &path, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);

        let (status, body) = send(&router, "GET", &path, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "not found" }));
    }

    #[tokio::test]
    async fn update_ignores_body_id() {
        let router = notes_router(Arc::new(MemoryDocumentStore::new()));
        let (_, created) = send(&router, "POST", "/v1/notes", Some(json!({ "title": "a" }))).await;
        let id = created["id"].as_str().unwrap().to_string();

        let (status, updated) = send(
            &router,
            "PUT",
            &format!("/v1/notes/{}", id),
            Some(json!({ "id": "not-an-id", "title": "b" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["id"], id.as_str());
    }

    #[tokio::test]
    async fn undecodable_stored_document_is_a_server_error() {
        let store = Arc::new(MemoryDocumentStore::new());
        let router = notes_router(store.clone());
        let id = ObjectId::new();
        store.insert("notes", &id, json!({ "title": 5 })).await.unwrap();
        let path = format!("/v1/notes/{}", id);

        let (status, _) = send(&router, "GET", &path, None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        // The update body alone would repair the field; the stored half still fails
        let (status, _) = send(&router, "PUT", &path, Some(json!({ "title": "fixed" }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn malformed_ids_do_not_match() {
        let router = notes_router(Arc::new(MemoryDocumentStore::new()));
        for path in ["/v1/notes/xyz", "/v1/notes/5A1B2C3D4E5F60718293A4B5"] {
            let (status, _) = send(&router, "GET", path, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", path);
            let (status, _) = send(&router, "DELETE", path, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", path);
        }
    }

    #[tokio::test]
    async fn search_matches_prefix() {
        let router = notes_router(Arc::new(MemoryDocumentStore::new()));
        for title in ["apple", "apricot", "banana"] {
            send(&router, "POST", "/v1/notes", Some(json!({ "title": title }))).await;
        }

        let (status, hits) = send(&router, "POST", "/v1/notes/_search", Some(json!({ "title": "ap" }))).await;
        assert_eq!(status, StatusCode::OK);
        let titles: Vec<_> = hits.as_array().unwrap().iter().map(|h| h["title"].clone()).collect();
        assert_eq!(titles, vec![json!("apple"), json!("apricot")]);

        let (status, _) = send(&router, "POST", "/v1/notes/_search", Some(json!({ "title": 1 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
