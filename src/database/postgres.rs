use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::object_id::ObjectId;
use super::store::{validate_collection_name, DocumentStore, SearchQuery, StoreError};

/// SQLSTATE raised by PostgreSQL for a malformed regular expression
const INVALID_REGULAR_EXPRESSION: &str = "2201B";
const UNIQUE_VIOLATION: &str = "23505";
const DUPLICATE_TABLE: &str = "42P07";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(INVALID_REGULAR_EXPRESSION) {
                return StoreError::InvalidPattern(db.message().to_string());
            }
        }
        StoreError::Sqlx(err)
    }
}

/// Document store backed by PostgreSQL: one `(id TEXT, doc JSONB)` table per collection
pub struct PgDocumentStore {
    pool: PgPool,
    /// Collections whose table is known to exist
    ensured: RwLock<HashSet<String>>,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ensured: RwLock::new(HashSet::new()),
        }
    }

    /// Open a pool against `url`
    pub async fn connect(url: &str, max_connections: u32, timeout_secs: u64) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(timeout_secs))
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Validate the name and create the backing table on first use. Returns the quoted table name.
    async fn table(&self, collection: &str) -> Result<String, StoreError> {
        validate_collection_name(collection)?;
        let table = quote_identifier(collection);

        // Fast path: try read lock
        {
            let ensured = self.ensured.read().await;
            if ensured.contains(collection) {
                return Ok(table);
            }
        }

        // Re-check under the write lock; DDL is serialized within the process
        let mut ensured = self.ensured.write().await;
        if ensured.contains(collection) {
            return Ok(table);
        }

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, doc JSONB NOT NULL)",
            table
        );
        match sqlx::query(&ddl).execute(&self.pool).await {
            Ok(_) => {}
            // Created by another process in the meantime
            Err(sqlx::Error::Database(db)) if is_concurrent_create(db.code().as_deref()) => {
                debug!("Collection table {} created concurrently: {}", collection, db.message());
            }
            Err(e) => return Err(e.into()),
        }

        ensured.insert(collection.to_string());
        info!("Ensured collection table: {}", collection);
        Ok(table)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// `CREATE TABLE IF NOT EXISTS` can still fail with these when two sessions race
fn is_concurrent_create(code: Option<&str>) -> bool {
    matches!(code, Some(UNIQUE_VIOLATION) | Some(DUPLICATE_TABLE))
}

/// Quote SQL identifier to prevent injection
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SELECT for a search query; every condition binds field and pattern as parameters
fn select_query<'a>(table: &str, query: &'a SearchQuery) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT doc FROM {}", table));

    for (i, condition) in query.conditions().iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        builder
            .push("jsonb_typeof(doc -> ")
            .push_bind(condition.field.as_str())
            .push(") IN ('string', 'number', 'boolean') AND doc ->> ")
            .push_bind(condition.field.as_str())
            .push(" ~ ")
            .push_bind(condition.pattern.as_str());
    }

    builder.push(" ORDER BY id");
    builder
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find_id(&self, collection: &str, id: &ObjectId) -> Result<Value, StoreError> {
        let table = self.table(collection).await?;
        let sql = format!("SELECT doc FROM {} WHERE id = $1", table);

        let row = sqlx::query(&sql)
            .bind(id.to_hex())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        let Json(doc) = row.try_get::<Json<Value>, _>("doc")?;
        Ok(doc)
    }

    async fn find(&self, collection: &str, query: &SearchQuery) -> Result<Vec<Value>, StoreError> {
        let table = self.table(collection).await?;
        let mut builder = select_query(&table, query);
        debug!("find {}: {}", collection, builder.sql());

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                row.try_get::<Json<Value>, _>("doc")
                    .map(|Json(doc)| doc)
                    .map_err(StoreError::from)
            })
            .collect()
    }

    async fn insert(&self, collection: &str, id: &ObjectId, doc: Value) -> Result<(), StoreError> {
        if !doc.is_object() {
            return Err(StoreError::NotAnObject);
        }
        let table = self.table(collection).await?;
        let sql = format!("INSERT INTO {} (id, doc) VALUES ($1, $2)", table);

        match sqlx::query(&sql)
            .bind(id.to_hex())
            .bind(Json(doc))
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(StoreError::Duplicate(*id)),
            Err(other) => Err(other.into()),
        }
    }

    async fn update_id(&self, collection: &str, id: &ObjectId, doc: Value) -> Result<(), StoreError> {
        if !doc.is_object() {
            return Err(StoreError::NotAnObject);
        }
        let table = self.table(collection).await?;
        let sql = format!("UPDATE {} SET doc = $2 WHERE id = $1", table);

        let result = sqlx::query(&sql)
            .bind(id.to_hex())
            .bind(Json(doc))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn remove_id(&self, collection: &str, id: &ObjectId) -> Result<(), StoreError> {
        let table = self.table(collection).await?;
        let sql = format!("DELETE FROM {} WHERE id = $1", table);

        let result = sqlx::query(&sql).bind(id.to_hex()).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
