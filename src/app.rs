use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::config::{AppConfig, SecurityConfig};
use crate::database::manager::SharedStore;
use crate::database::store::StoreError;
use crate::handlers::{self, ServerState};
use crate::models::Project;
use crate::rest::{make_path, RecordEndpointMaker};

/// Collection backing the project endpoints
pub const PROJECTS: &str = "projects";

/// Build the full application router over `store`
pub fn app(store: SharedStore, config: &AppConfig) -> Result<Router, StoreError> {
    let state = ServerState {
        store: store.clone(),
        config: Arc::new(config.clone()),
    };

    let server_routes = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(&make_path(&config.api.prefix, "version", &[]), get(handlers::version))
        .with_state(state);

    let records = RecordEndpointMaker::with_router(&config.api.prefix, server_routes, store)
        .make_crud::<Project>(PROJECTS)?
        .into_router();

    let mut router = records.layer(DefaultBodyLimit::max(config.api.max_request_size_bytes));

    if config.security.enable_cors {
        router = router.layer(cors_layer(&config.security));
    }
    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    Ok(router)
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let allow_origin = if security.cors_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}
