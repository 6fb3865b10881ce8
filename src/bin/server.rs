//! # Authorization HTTP Server
//!
//! REST surface over the decision engine, rule administration and the audit
//! trail. Intended to sit behind the backend perimeter: callers are trusted
//! internal services that have already authenticated the actor.
//!
//! ## Endpoints
//!
//! - `POST /v1/check` - Authorization decision
//! - `POST /v1/rules` - Create a rule
//! - `PUT /v1/rules/:id` - Update a rule
//! - `DELETE /v1/rules/:id` - Disable a rule (soft delete)
//! - `POST /v1/assignments` - Record a role assignment change
//! - `GET /v1/audit` - Query the audit trail
//! - `POST /v1/retention/purge` - Purge aged audit entries
//! - `GET /health` - Health check
//!
//! ## Configuration
//!
//! Environment variables:
//! - `PORT` - HTTP server port (default: 8080)
//! - `DATABASE_URL` - Postgres connection string; omitted runs in-memory
//! - `CATALOG_PATH` - JSON file with roles/resources/actions
//! - `RUST_LOG` - Log level (default: info)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    serve, Router,
};
use chrono::{DateTime, Utc};
use salepoint_authz::{
    ActionDef, ActorContext, AdminService, AuditQuery, AuditTargetType, AuthorizationRequest,
    AuthzError, Catalog, DecisionEngine, InMemoryPolicyStore, PermissionRule, PolicyStore,
    ResourceDef, RetentionEnforcer, Role, ScopeKind,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
struct AppState {
    engine: Arc<DecisionEngine>,
    admin: Arc<AdminService>,
    retention: Arc<RetentionEnforcer>,
    store: Arc<dyn PolicyStore>,
    start_time: std::time::Instant,
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// Application error type
#[derive(Debug)]
struct AppError(AuthzError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            AuthzError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            AuthzError::RuleNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AuthzError::RetentionForbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AuthzError::UnknownRole(_)
            | AuthzError::UnknownResource(_)
            | AuthzError::UnknownAction(_) => (StatusCode::UNPROCESSABLE_ENTITY, "configuration"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        // Internal detail stays in the logs, not the response.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {}", self.0);
            "internal error".to_string()
        } else {
            self.0.to_string()
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        AppError(err)
    }
}

/// Authorization check response
#[derive(Debug, Serialize)]
struct CheckResponse {
    allowed: bool,
    scope: ScopeKind,
    matched_rule_ids: Vec<Uuid>,
    decided_at: DateTime<Utc>,
}

/// POST /v1/check
///
/// A denied decision is a 403 with a uniform body; matched rules are never
/// disclosed to a denied caller.
async fn check_authorization(
    State(state): State<AppState>,
    Json(req): Json<AuthorizationRequest>,
) -> Result<Response, AppError> {
    let decision = state.engine.decide(&req).await?;

    if !decision.allowed {
        let body = Json(ErrorResponse {
            error: "forbidden".to_string(),
            message: "access denied".to_string(),
        });
        return Ok((StatusCode::FORBIDDEN, body).into_response());
    }

    let response = CheckResponse {
        allowed: decision.allowed,
        scope: decision.scope,
        matched_rule_ids: decision.matched_rule_ids,
        decided_at: decision.decided_at,
    };
    Ok(Json(response).into_response())
}

#[derive(Debug, Deserialize)]
struct RuleSubmission {
    actor: ActorContext,
    rule: PermissionRule,
    #[serde(default)]
    reason: Option<String>,
}

/// POST /v1/rules
async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<RuleSubmission>,
) -> Result<(StatusCode, Json<PermissionRule>), AppError> {
    let created = state.admin.create_rule(&req.actor, req.rule, req.reason).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /v1/rules/:id
async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RuleSubmission>,
) -> Result<Json<PermissionRule>, AppError> {
    let mut rule = req.rule;
    rule.id = id;
    let updated = state.admin.update_rule(&req.actor, rule, req.reason).await?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
struct DisableSubmission {
    actor: ActorContext,
    #[serde(default)]
    reason: Option<String>,
}

/// DELETE /v1/rules/:id - soft delete
async fn disable_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<DisableSubmission>,
) -> Result<StatusCode, AppError> {
    state.admin.disable_rule(&req.actor, id, req.reason).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct AssignmentSubmission {
    actor: ActorContext,
    user_id: Uuid,
    #[serde(default)]
    previous_role: Option<Uuid>,
    #[serde(default)]
    new_role: Option<Uuid>,
    #[serde(default)]
    reason: Option<String>,
}

/// POST /v1/assignments
async fn record_assignment(
    State(state): State<AppState>,
    Json(req): Json<AssignmentSubmission>,
) -> Result<StatusCode, AppError> {
    state
        .admin
        .record_role_assignment(&req.actor, req.user_id, req.previous_role, req.new_role, req.reason)
        .await?;
    Ok(StatusCode::CREATED)
}

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
struct AuditParams {
    #[serde(default)]
    target_type: Option<AuditTargetType>,
    #[serde(default)]
    target_id: Option<Uuid>,
    #[serde(default)]
    actor_user_id: Option<Uuid>,
    #[serde(default)]
    limit: Option<usize>,
}

/// GET /v1/audit - by target or by actor, time-descending
async fn query_audit(
    State(state): State<AppState>,
    Query(params): Query<AuditParams>,
) -> Result<Json<Vec<salepoint_authz::AuditEntry>>, AppError> {
    let query = match (params.target_type, params.target_id, params.actor_user_id) {
        (Some(target_type), Some(target_id), None) => AuditQuery::ByTarget {
            target_type,
            target_id,
        },
        (None, None, Some(actor_user_id)) => AuditQuery::ByActor { actor_user_id },
        _ => {
            return Err(AppError(AuthzError::Validation(
                "supply either target_type+target_id or actor_user_id".into(),
            )))
        }
    };

    let limit = params
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .min(MAX_AUDIT_LIMIT);
    let entries = state.store.query_audit(query, limit).await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
struct PurgeSubmission {
    actor: ActorContext,
    cutoff: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct PurgeResponse {
    deleted: u64,
}

/// POST /v1/retention/purge
async fn purge_audit(
    State(state): State<AppState>,
    Json(req): Json<PurgeSubmission>,
) -> Result<Json<PurgeResponse>, AppError> {
    let deleted = state.retention.purge_older_than(&req.actor, req.cutoff).await?;
    Ok(Json(PurgeResponse { deleted }))
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    version: String,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: salepoint_authz::VERSION.to_string(),
    })
}

/// Catalog file shape: flat lists of reference data.
#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    roles: Vec<Role>,
    #[serde(default)]
    resources: Vec<ResourceDef>,
    #[serde(default)]
    actions: Vec<ActionDef>,
}

fn load_catalog() -> std::io::Result<Catalog> {
    let file = match std::env::var("CATALOG_PATH") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str::<CatalogFile>(&raw)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
        }
        Err(_) => CatalogFile::default(),
    };

    let mut catalog = Catalog::new();
    for role in file.roles {
        catalog = catalog.with_role(role);
    }
    for resource in file.resources {
        catalog = catalog.with_resource(resource);
    }
    for action in file.actions {
        catalog = catalog.with_action(action);
    }
    Ok(catalog)
}

async fn build_store(catalog: Catalog) -> std::io::Result<Arc<dyn PolicyStore>> {
    #[cfg(feature = "postgres")]
    if let Ok(url) = std::env::var("DATABASE_URL") {
        let store = salepoint_authz::PostgresPolicyStore::new(&url, catalog)
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        store
            .run_migrations()
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        info!("using Postgres policy store");
        return Ok(Arc::new(store));
    }

    info!("DATABASE_URL not set, using in-memory policy store");
    Ok(Arc::new(InMemoryPolicyStore::new(catalog)))
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/v1/check", post(check_authorization))
        .route("/v1/rules", post(create_rule))
        .route("/v1/rules/:id", put(update_rule).delete(disable_rule))
        .route("/v1/assignments", post(record_assignment))
        .route("/v1/audit", get(query_audit))
        .route("/v1/retention/purge", post(purge_audit))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Starting graceful shutdown");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Salepoint authorization server v{}", salepoint_authz::VERSION);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let catalog = load_catalog()?;
    let store = build_store(catalog).await?;

    let state = AppState {
        engine: Arc::new(DecisionEngine::new(store.clone())),
        admin: Arc::new(AdminService::new(store.clone())),
        retention: Arc::new(RetentionEnforcer::new(store.clone())),
        store,
        start_time: std::time::Instant::now(),
    };

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Starting HTTP server on {}", addr);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind HTTP server: {}", e);
            return Err(e);
        }
    };

    match serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        Ok(()) => {
            info!("Server shut down gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Server error: {}", e);
            Err(e)
        }
    }
}
