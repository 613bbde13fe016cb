//! # Cohort HTTP API Module
//!
//! REST surface over the `MetadataCollection` operations.
//!
//! ## Endpoints
//!
//! Unscoped:
//! - `GET  /health` - Health check
//! - `GET  /status` - Identity, capabilities and metrics
//! - `POST /archives/export` - Export every non-deleted instance
//!
//! Scoped by the acting user, under `/users/{user_id}`:
//! - `POST /entities`, `/entities/external`, `/entities/proxies`
//! - `GET  /entities/{guid}`, `/known`, `/proxy`, `/relationships`
//! - `POST /entities/{guid}/status|properties|delete|purge|restore`
//! - `POST /entities/{guid}/re-identify|re-type|re-home`
//! - `POST /entities/{guid}/classifications/{name}` (+ `/delete`, `/properties`)
//! - the same shapes under `/relationships`
//! - `POST /reference-copies/entities|classifications|relationships` (+ purge)
//! - `GET  /instances/{guid}/status`
//! - `POST /archives/load`
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `COHORT_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `COHORT_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `COHORT_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
pub mod types;

pub use auth::get_api_key_from_env;
pub use handlers::status_for;
pub use middleware::{DEFAULT_RATE_LIMIT, create_rate_limiter};

use crate::node::CohortNode;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use cohort_core::{CohortError, MetadataCollection};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Request bodies above this size are rejected (archives included).
const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub collection: Arc<dyn MetadataCollection>,
    /// Requests per second; 0 disables rate limiting.
    pub rate_limit: u32,
}

impl AppState {
    #[must_use]
    pub fn new(collection: Arc<dyn MetadataCollection>) -> Self {
        Self {
            collection,
            rate_limit: DEFAULT_RATE_LIMIT,
        }
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: u32) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from `COHORT_CORS_ORIGINS`.
///
/// - "*": all origins
/// - unset: localhost only
/// - otherwise: a comma-separated origin list
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("COHORT_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (COHORT_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in COHORT_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No COHORT_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTES
// =============================================================================

fn entity_routes() -> Router<AppState> {
    use handlers::*;

    Router::new()
        .route("/users/{user_id}/entities", post(add_entity_handler))
        .route(
            "/users/{user_id}/entities/external",
            post(add_external_entity_handler),
        )
        .route(
            "/users/{user_id}/entities/proxies",
            post(add_entity_proxy_handler),
        )
        .route("/users/{user_id}/entities/{guid}", get(get_entity_handler))
        .route(
            "/users/{user_id}/entities/{guid}/known",
            get(is_entity_known_handler),
        )
        .route(
            "/users/{user_id}/entities/{guid}/proxy",
            get(get_entity_proxy_handler),
        )
        .route(
            "/users/{user_id}/entities/{guid}/relationships",
            get(relationships_for_entity_handler),
        )
        .route(
            "/users/{user_id}/entities/{guid}/status",
            post(update_entity_status_handler),
        )
        .route(
            "/users/{user_id}/entities/{guid}/properties",
            post(update_entity_properties_handler),
        )
        .route(
            "/users/{user_id}/entities/{guid}/delete",
            post(delete_entity_handler),
        )
        .route(
            "/users/{user_id}/entities/{guid}/purge",
            post(purge_entity_handler),
        )
        .route(
            "/users/{user_id}/entities/{guid}/restore",
            post(restore_entity_handler),
        )
        .route(
            "/users/{user_id}/entities/{guid}/re-identify",
            post(re_identify_entity_handler),
        )
        .route(
            "/users/{user_id}/entities/{guid}/re-type",
            post(re_type_entity_handler),
        )
        .route(
            "/users/{user_id}/entities/{guid}/re-home",
            post(re_home_entity_handler),
        )
        .route(
            "/users/{user_id}/entities/{guid}/classifications/{name}",
            post(classify_entity_handler),
        )
        .route(
            "/users/{user_id}/entities/{guid}/classifications/{name}/delete",
            post(declassify_entity_handler),
        )
        .route(
            "/users/{user_id}/entities/{guid}/classifications/{name}/properties",
            post(update_classification_handler),
        )
}

fn relationship_routes() -> Router<AppState> {
    use handlers::*;

    Router::new()
        .route("/users/{user_id}/relationships", post(add_relationship_handler))
        .route(
            "/users/{user_id}/relationships/external",
            post(add_external_relationship_handler),
        )
        .route(
            "/users/{user_id}/relationships/{guid}",
            get(get_relationship_handler),
        )
        .route(
            "/users/{user_id}/relationships/{guid}/known",
            get(is_relationship_known_handler),
        )
        .route(
            "/users/{user_id}/relationships/{guid}/status",
            post(update_relationship_status_handler),
        )
        .route(
            "/users/{user_id}/relationships/{guid}/properties",
            post(update_relationship_properties_handler),
        )
        .route(
            "/users/{user_id}/relationships/{guid}/delete",
            post(delete_relationship_handler),
        )
        .route(
            "/users/{user_id}/relationships/{guid}/purge",
            post(purge_relationship_handler),
        )
        .route(
            "/users/{user_id}/relationships/{guid}/restore",
            post(restore_relationship_handler),
        )
        .route(
            "/users/{user_id}/relationships/{guid}/re-identify",
            post(re_identify_relationship_handler),
        )
        .route(
            "/users/{user_id}/relationships/{guid}/re-type",
            post(re_type_relationship_handler),
        )
        .route(
            "/users/{user_id}/relationships/{guid}/re-home",
            post(re_home_relationship_handler),
        )
}

fn reference_copy_routes() -> Router<AppState> {
    use handlers::*;

    Router::new()
        .route(
            "/users/{user_id}/reference-copies/entities",
            post(save_entity_copy_handler),
        )
        .route(
            "/users/{user_id}/reference-copies/entities/{guid}/purge",
            post(purge_entity_copy_handler),
        )
        .route(
            "/users/{user_id}/reference-copies/classifications",
            post(save_classification_copy_handler),
        )
        .route(
            "/users/{user_id}/reference-copies/classifications/purge",
            post(purge_classification_copy_handler),
        )
        .route(
            "/users/{user_id}/reference-copies/relationships",
            post(save_relationship_copy_handler),
        )
        .route(
            "/users/{user_id}/reference-copies/relationships/{guid}/purge",
            post(purge_relationship_copy_handler),
        )
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting (if enabled)
/// 5. Authentication (if configured)
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    let rate_limiter = if state.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", state.rate_limit);
        Some(create_rate_limiter(state.rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set COHORT_API_KEY environment variable to enable authentication."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/archives/export", post(handlers::export_archive_handler))
        .route(
            "/users/{user_id}/archives/load",
            post(handlers::load_archive_handler),
        )
        .route(
            "/users/{user_id}/instances/{guid}/status",
            get(handlers::instance_status_handler),
        )
        .merge(entity_routes())
        .merge(relationship_routes())
        .merge(reference_copy_routes());

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(MAX_BODY_SIZE)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve until Ctrl+C, then save the node.
pub async fn run_server(addr: &str, node: CohortNode, rate_limit: u32) -> Result<(), CohortError> {
    let state = AppState::new(node.collection()).with_rate_limit(rate_limit);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CohortError::Repository(format!("Bind failed: {e}")))?;

    tracing::info!("Cohort HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CohortError::Repository(format!("Server error: {e}")))?;

    tracing::info!("Shutting down, saving repository");
    node.save()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
