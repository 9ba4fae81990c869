use serde_json::Value;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use super::memory::MemoryDocumentStore;
use super::object_id::ObjectId;
use super::postgres::PgDocumentStore;
use super::store::{validate_collection_name, DocumentStore, SearchQuery, StoreError};
use crate::config::{AppConfig, StoreKind};

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Database session was already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type SharedStore = Arc<dyn DocumentStore>;

/// Process-wide document store session
pub struct DatabaseManager;

impl DatabaseManager {
    fn session() -> &'static OnceCell<SharedStore> {
        static SESSION: OnceLock<OnceCell<SharedStore>> = OnceLock::new();
        SESSION.get_or_init(OnceCell::new)
    }

    /// Connect the process-wide session. Fails if a session already exists.
    pub async fn init(config: &AppConfig) -> Result<SharedStore, DatabaseError> {
        if Self::session().initialized() {
            return Err(DatabaseError::AlreadyInitialized);
        }
        let store = Self::connect(config).await?;
        Self::session()
            .set(store.clone())
            .map_err(|_| DatabaseError::AlreadyInitialized)?;
        Ok(store)
    }

    /// The session connected by `init`, if any
    pub fn current() -> Option<SharedStore> {
        Self::session().get().cloned()
    }

    /// Build a store from config without touching the shared session
    pub async fn connect(config: &AppConfig) -> Result<SharedStore, DatabaseError> {
        match config.database.store {
            StoreKind::Memory => {
                info!("Using in-memory document store");
                Ok(Arc::new(MemoryDocumentStore::new()))
            }
            StoreKind::Postgres => {
                let connection_string = Self::build_connection_string(
                    config.database.url.as_deref(),
                    &config.database.name,
                )?;
                let store = PgDocumentStore::connect(
                    &connection_string,
                    config.database.max_connections,
                    config.database.connection_timeout,
                )
                .await?;
                info!("Connected document store database: {}", config.database.name);
                Ok(Arc::new(store))
            }
        }
    }

    /// Swap the database name into the path of the base URL
    fn build_connection_string(base: Option<&str>, database_name: &str) -> Result<String, DatabaseError> {
        let base = base.ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;

        let mut url = url::Url::parse(base).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        // Replace the path to the database name (ensure leading slash)
        url.set_path(&format!("/{}", database_name));
        Ok(url.into())
    }
}

/// A document store bound to one validated collection name
#[derive(Clone)]
pub struct Collection {
    store: SharedStore,
    name: Arc<str>,
}

impl Collection {
    pub fn new(store: SharedStore, name: &str) -> Result<Self, StoreError> {
        validate_collection_name(name)?;
        Ok(Self {
            store,
            name: Arc::from(name),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn find_id(&self, id: &ObjectId) -> Result<Value, StoreError> {
        self.store.find_id(&self.name, id).await
    }

    pub async fn find(&self, query: &SearchQuery) -> Result<Vec<Value>, StoreError> {
        self.store.find(&self.name, query).await
    }

    pub async fn insert(&self, id: &ObjectId, doc: Value) -> Result<(), StoreError> {
        self.store.insert(&self.name, id, doc).await
    }

    pub async fn update_id(&self, id: &ObjectId, doc: Value) -> Result<(), StoreError> {
        self.store.update_id(&self.name, id, doc).await
    }

    pub async fn remove_id(&self, id: &ObjectId) -> Result<(), StoreError> {
        self.store.remove_id(&self.name, id).await
    }
}
