use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::manager::SharedStore;

/// State shared by the server-level handlers
#[derive(Clone)]
pub struct ServerState {
    pub store: SharedStore,
    pub config: Arc<AppConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: String,
    pub name: String,
}

/// GET /{prefix}/version
pub async fn version(State(state): State<ServerState>) -> Json<ServerInfo> {
    Json(ServerInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: state.config.api.server_name.clone(),
    })
}

/// GET /
pub async fn root(State(state): State<ServerState>) -> Json<Value> {
    let prefix = &state.config.api.prefix;

    Json(json!({
        "name": state.config.api.server_name,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "version": format!("/{}/version", prefix),
            "health": "/health",
            "records": format!("/{}/:record[/:id]", prefix),
            "search": format!("/{}/:record/_search", prefix),
        }
    }))
}

/// GET /health
pub async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "timestamp": now,
                "database": "ok"
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "timestamp": now,
                    "error": "database unavailable",
                    "database_error": e.to_string()
                })),
            )
        }
    }
}
