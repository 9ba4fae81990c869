#![allow(dead_code)]

use std::sync::Arc;

use alpaca_api::app::app;
use alpaca_api::config::{AppConfig, StoreKind};
use alpaca_api::database::{DocumentStore, MemoryDocumentStore, ObjectId, SearchQuery, SharedStore, StoreError};
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp<S = MemoryDocumentStore> {
    pub router: Router,
    pub store: Arc<S>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.database.store = StoreKind::Memory;
    config.api.enable_request_logging = false;
    config
}

/// Store whose every call fails, standing in for an unreachable database
pub struct DownStore;

impl DownStore {
    fn error() -> StoreError {
        StoreError::Backend("down".to_string())
    }
}

#[async_trait]
impl DocumentStore for DownStore {
    async fn find_id(&self, _: &str, _: &ObjectId) -> Result<Value, StoreError> {
        Err(Self::error())
    }

    async fn find(&self, _: &str, _: &SearchQuery) -> Result<Vec<Value>, StoreError> {
        Err(Self::error())
    }

    async fn insert(&self, _: &str, _: &ObjectId, _: Value) -> Result<(), StoreError> {
        Err(Self::error())
    }

    async fn update_id(&self, _: &str, _: &ObjectId, _: Value) -> Result<(), StoreError> {
        Err(Self::error())
    }

    async fn remove_id(&self, _: &str, _: &ObjectId) -> Result<(), StoreError> {
        Err(Self::error())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(Self::error())
    }
}

impl TestApp {
    pub fn new() -> Result<Self> {
        Self::with_config(&test_config())
    }

    pub fn with_config(config: &AppConfig) -> Result<Self> {
        Self::over(Arc::new(MemoryDocumentStore::new()), config)
    }
}

impl TestApp<DownStore> {
    pub fn down() -> Result<Self> {
        Self::over(Arc::new(DownStore), &test_config())
    }
}

impl<S: DocumentStore> TestApp<S> {
    pub fn over(store: Arc<S>, config: &AppConfig) -> Result<Self> {
        let shared: SharedStore = store.clone();
        let router = app(shared, config)?;
        Ok(Self { router, store })
    }

    pub async fn send(&self, request: Request<Body>) -> Result<TestResponse> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok(TestResponse { status, headers, body })
    }

    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> Result<TestResponse> {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };
        self.send(request).await
    }

    /// POST a project and return the created document
    pub async fn create_project(&self, name: &str, category: &str, description: &str) -> Result<Value> {
        let res = self
            .request(
                "POST",
                "/api/projects",
                Some(serde_json::json!({
                    "name": name,
                    "category": category,
                    "description": description,
                })),
            )
            .await?;
        anyhow::ensure!(res.status == StatusCode::OK, "create failed: {} {}", res.status, res.body);
        Ok(res.body)
    }
}
