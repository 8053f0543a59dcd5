//! HTTP API for route queries, verification, multi-sig, and monitoring

use crate::chain::ChainRegistry;
use crate::config::ApiConfig;
use crate::consensus::{ConsensusCoordinator, VerificationRequest, VerificationStore};
use crate::error::{CoreError, CoreResult};
use crate::multisig::{MultiSigCoordinator, MultiSigRequest};
use crate::routing::{PoolGraph, Route, RouteOptimizer, RouteQuery, Strategy};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<PoolGraph>,
    pub optimizer: Arc<RouteOptimizer>,
    pub registry: Arc<ChainRegistry>,
    pub consensus: Arc<ConsensusCoordinator>,
    pub store: Arc<VerificationStore>,
    pub multisig: Arc<MultiSigCoordinator>,
    pub started_at: DateTime<Utc>,
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> CoreResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/status", get(get_status))
        .route("/stats", get(get_stats))
        .route("/routes", post(compute_routes))
        .route("/routes/optimal", post(compute_optimal_route))
        .route("/verifications", post(create_verification))
        .route("/verifications/:id", get(get_verification))
        .route("/verifications/:id/refresh", post(refresh_verification))
        .route("/verifications/:id/cancel", post(cancel_verification))
        .route("/multisig", post(create_multisig))
        .route("/multisig/:id", get(get_multisig))
        .route("/multisig/:id/signatures", post(submit_signature))
        .route("/multisig/:id/rejections", post(submit_rejection))
        .route("/multisig/:id/cancel", post(cancel_multisig))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API error wrapper mapping domain errors onto HTTP status codes
struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::RequestNotFound { .. } | CoreError::NoRouteFound { .. } => {
                StatusCode::NOT_FOUND
            }
            CoreError::InvalidRequest(_)
            | CoreError::DustAmount { .. }
            | CoreError::ChainNotFound { .. }
            | CoreError::InvalidSignature { .. } => StatusCode::BAD_REQUEST,
            CoreError::TerminalRequest { .. } => StatusCode::CONFLICT,
            CoreError::InsufficientLiquidity { .. } | CoreError::EmptyGraph => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CoreError::ChainUnreachable { .. } => StatusCode::BAD_GATEWAY,
            CoreError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - chain clients reachable and graph loaded
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let chain_health = state.registry.health_check().await;
    let chains_ok = !chain_health.is_empty() && chain_health.iter().all(|(_, healthy)| *healthy);
    let graph_ok = !state.graph.snapshot().is_empty();

    let response = ReadinessResponse {
        ready: chains_ok,
        graph_loaded: graph_ok,
        chains: chain_health
            .into_iter()
            .map(|(chain, healthy)| ChainHealth { chain, healthy })
            .collect(),
    };

    if response.ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Get coordinator status
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let chain_health = state.registry.health_check().await;
    let snapshot = state.graph.snapshot();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds().max(0) as u64,
        registered_chains: state.registry.registered_chains(),
        chain_status: chain_health
            .into_iter()
            .map(|(chain, healthy)| ChainHealth { chain, healthy })
            .collect(),
        pool_count: snapshot.pool_count(),
        bridge_edge_count: snapshot.bridge_edge_count(),
    })
}

/// Get verification and multi-sig statistics
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    let verifications = state.store.stats();
    let multisig: HashMap<String, u64> = state
        .multisig
        .stats()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

    Json(StatsResponse {
        verifications,
        multisig,
    })
}

/// Compute routes for all strategies
async fn compute_routes(
    State(state): State<AppState>,
    Json(query): Json<RouteQuery>,
) -> Result<Json<RoutesResponse>, ApiError> {
    let routes = state.optimizer.find_routes(&query)?;
    Ok(Json(RoutesResponse {
        routes: routes
            .into_iter()
            .map(|(strategy, route)| (strategy.as_str().to_string(), route))
            .collect(),
    }))
}

/// Compute the single best route under one strategy
async fn compute_optimal_route(
    State(state): State<AppState>,
    Json(body): Json<OptimalRouteBody>,
) -> Result<Json<Route>, ApiError> {
    let strategy: Strategy = body
        .strategy
        .parse()
        .map_err(|_| CoreError::InvalidRequest(format!("unknown strategy: {}", body.strategy)))?;
    let route = state.optimizer.find_optimal_route(&body.query, strategy)?;
    Ok(Json(route))
}

/// Start (or rejoin) a multi-chain verification
async fn create_verification(
    State(state): State<AppState>,
    Json(body): Json<VerifyBody>,
) -> Result<Json<VerificationRequest>, ApiError> {
    let timeout = body.timeout_ms.map(Duration::from_millis);
    let request = state
        .consensus
        .verify(
            &body.transaction_id,
            &body.source_chain,
            body.target_chains,
            body.required_confirmations,
            timeout,
        )
        .await?;
    Ok(Json(request))
}

async fn get_verification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VerificationRequest>, ApiError> {
    Ok(Json(state.consensus.get(id)?))
}

/// Re-poll chains that have not reached a final per-chain state
async fn refresh_verification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VerificationRequest>, ApiError> {
    Ok(Json(state.consensus.refresh(id).await?))
}

async fn cancel_verification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VerificationRequest>, ApiError> {
    Ok(Json(state.consensus.cancel(id).await?))
}

/// Create a multi-sig request collecting signatures from secondary chains
async fn create_multisig(
    State(state): State<AppState>,
    Json(body): Json<CreateMultiSigBody>,
) -> Result<Json<MultiSigRequest>, ApiError> {
    let request = state.multisig.create_request(
        &body.vault_id,
        &body.source_chain,
        body.secondary_chains,
        body.required_signatures,
    )?;
    Ok(Json(request))
}

async fn get_multisig(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MultiSigRequest>, ApiError> {
    Ok(Json(state.multisig.get(id)?))
}

async fn submit_signature(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SignatureBody>,
) -> Result<Json<MultiSigRequest>, ApiError> {
    let request = state
        .multisig
        .submit_signature(id, &body.chain, &body.signature)
        .await?;
    Ok(Json(request))
}

async fn submit_rejection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectionBody>,
) -> Result<Json<MultiSigRequest>, ApiError> {
    Ok(Json(state.multisig.record_rejection(id, &body.chain)?))
}

async fn cancel_multisig(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MultiSigRequest>, ApiError> {
    Ok(Json(state.multisig.cancel(id)?))
}

// Request and response types

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    graph_loaded: bool,
    chains: Vec<ChainHealth>,
}

#[derive(Serialize)]
struct ChainHealth {
    chain: String,
    healthy: bool,
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_seconds: u64,
    registered_chains: Vec<String>,
    chain_status: Vec<ChainHealth>,
    pool_count: usize,
    bridge_edge_count: usize,
}

#[derive(Serialize)]
struct StatsResponse {
    verifications: crate::consensus::VerificationStats,
    multisig: HashMap<String, u64>,
}

#[derive(Serialize)]
struct RoutesResponse {
    routes: HashMap<String, Route>,
}

#[derive(Deserialize)]
struct OptimalRouteBody {
    #[serde(flatten)]
    query: RouteQuery,
    strategy: String,
}

#[derive(Deserialize)]
struct VerifyBody {
    transaction_id: String,
    source_chain: String,
    target_chains: Vec<String>,
    required_confirmations: Option<HashMap<String, u64>>,
    timeout_ms: Option<u64>,
}

#[derive(Deserialize)]
struct CreateMultiSigBody {
    vault_id: String,
    source_chain: String,
    secondary_chains: Vec<String>,
    required_signatures: usize,
}

#[derive(Deserialize)]
struct SignatureBody {
    chain: String,
    signature: String,
}

#[derive(Deserialize)]
struct RejectionBody {
    chain: String,
}
