//! HTTP API for the operations dashboard.
//!
//! Provides:
//! - `/health` - Daemon health including database reachability
//! - `/api/status` - Merged server/pc repository view with drift
//! - `/api/repo-hash` - Polling fingerprint for one repository
//! - `/api/git-commit` - Commit detail from a sandboxed checkout
//! - `/api/clients`, `/api/devs` - Client and developer bookkeeping
//! - `/api/ai-team/status`, `/api/ai-team/control` - Worker fan-out and control
//! - `/api/droplet/metrics` - Host load, memory and disk

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use fleetdash_common::validate::{require, validate_commit_sha};
use fleetdash_common::{DriftStatus, MergedRepoView};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::clients::{DevAssignment, NewClientRequest, NewDevRequest};
use crate::control::{ControlProxy, ControlRequest};
use crate::errors::ApiError;
use crate::git::{GitInspector, RepoSandbox};
use crate::health::{ProbeCounts, WorkerProber, WorkerSpec};
use crate::host_metrics::HostMetricsCollector;
use crate::repo_state::ReconciledState;
use crate::resolver::{self, ResolvedRepo};
use crate::store::DashboardStore;

/// Shared state for HTTP handlers.
pub struct HttpState {
    pub store: Arc<dyn DashboardStore>,
    /// Allow-list gate for git lookups.
    pub sandbox: RepoSandbox,
    pub inspector: GitInspector,
    pub prober: WorkerProber,
    pub control: ControlProxy,
    /// Workers in display order.
    pub roster: Vec<WorkerSpec>,
    pub metrics: HostMetricsCollector,
    /// Daemon version.
    pub version: &'static str,
    /// Daemon start time.
    pub started_at: Instant,
    /// Daemon PID.
    pub pid: u32,
}

type ApiResult<T> = Result<T, ApiError>;

/// Success body: `{"success": true, ...fields}`.
#[derive(Serialize)]
struct Success<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        data,
    })
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::invalid("body", rejection.body_text()))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(q)| q)
        .map_err(|rejection| ApiError::invalid("query", rejection.body_text()))
}

fn path_id(id: Result<Path<i64>, PathRejection>) -> ApiResult<i64> {
    id.map(|Path(id)| id)
        .map_err(|rejection| ApiError::invalid("id", rejection.body_text()))
}

/// Create the HTTP router.
pub fn create_router(state: HttpState) -> Router {
    let api = Router::new()
        .route("/status", get(status_handler))
        .route("/repo-hash", get(repo_hash_handler))
        .route("/git-commit", get(git_commit_handler))
        .route("/clients", get(list_clients_handler).post(create_client_handler))
        .route(
            "/clients/{id}/devs",
            post(assign_dev_handler).delete(unassign_dev_handler),
        )
        .route("/devs", get(list_devs_handler).post(create_dev_handler))
        .route("/ai-team/status", get(team_status_handler))
        .route("/ai-team/control", post(team_control_handler))
        .route("/droplet/metrics", get(droplet_metrics_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .with_state(Arc::new(state))
}

// ── Health ─────────────────────────────────────────────────────────────────

/// Handler for `/health`.
///
/// Always 200; `database` reports whether the pool answers a ping.
async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let database = match state.store.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            debug!("Health ping failed: {}", e);
            "unreachable"
        }
    };

    Json(json!({
        "status": if database == "ok" { "healthy" } else { "degraded" },
        "version": state.version,
        "pid": state.pid,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "database": database,
    }))
}

// ── Repository state ───────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize)]
struct DriftSummary {
    total: usize,
    green: usize,
    orange: usize,
    red: usize,
    gray: usize,
}

impl DriftSummary {
    fn of(views: &[MergedRepoView]) -> Self {
        let mut summary = Self {
            total: views.len(),
            ..Self::default()
        };
        for view in views {
            match view.drift_status {
                DriftStatus::Green => summary.green += 1,
                DriftStatus::Orange => summary.orange += 1,
                DriftStatus::Red => summary.red += 1,
                DriftStatus::Gray => summary.gray += 1,
            }
        }
        summary
    }
}

#[derive(Serialize)]
struct StatusBody {
    repos: Vec<MergedRepoView>,
    summary: DriftSummary,
    timestamp: chrono::DateTime<Utc>,
}

/// Handler for `/api/status`.
async fn status_handler(State(state): State<Arc<HttpState>>) -> ApiResult<impl IntoResponse> {
    let now = Utc::now();
    let reconciled = ReconciledState::load(state.store.as_ref(), now).await?;
    let repos = reconciled.ledger.merged_views();
    Ok(ok(StatusBody {
        summary: DriftSummary::of(&repos),
        repos,
        timestamp: now,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct RepoQuery {
    repo: Option<String>,
    sha: Option<String>,
}

/// Handler for `/api/repo-hash?repo=`.
async fn repo_hash_handler(
    State(state): State<Arc<HttpState>>,
    params: Result<Query<RepoQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let params = query(params)?;
    let repo = require("repo", params.repo.as_deref())?;

    let reconciled = ReconciledState::load(state.store.as_ref(), Utc::now()).await?;
    Ok(ok(reconciled.ledger.fingerprint(repo, &reconciled.keys)))
}

// ── Commit detail ──────────────────────────────────────────────────────────

/// Registry first; merged state only when the registry has no match.
async fn resolve_repo(state: &HttpState, identifier: &str) -> ApiResult<ResolvedRepo> {
    let registry = state.store.repo_registry().await?;
    if let Some(found) = resolver::resolve_in_registry(identifier, &registry) {
        return Ok(found);
    }

    let (canonical, reconciled) = tokio::try_join!(
        state.store.canonical_repo_paths(),
        ReconciledState::load(state.store.as_ref(), Utc::now()),
    )?;
    resolver::resolve_in_state(identifier, &canonical, &reconciled.ledger)
        .ok_or_else(|| ApiError::NotFound(format!("repository '{identifier}' not found")))
}

/// Handler for `/api/git-commit?repo=&sha=`.
///
/// Input is validated before any store call or subprocess.
async fn git_commit_handler(
    State(state): State<Arc<HttpState>>,
    params: Result<Query<RepoQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let params = query(params)?;
    let sha = validate_commit_sha(require("sha", params.sha.as_deref())?)?;
    let repo = require("repo", params.repo.as_deref())?;

    let resolved = resolve_repo(&state, repo).await?;
    let checkout = state.sandbox.check(&resolved.path).await?;
    debug!(repo, path = %checkout.display(), source = ?resolved.source, "Resolved repository");

    let commit = state.inspector.commit_detail(&checkout, sha).await?;
    Ok(ok(json!({
        "repo": resolved.slug,
        "commit": commit,
    })))
}

// ── Clients & developers ───────────────────────────────────────────────────

/// Handler for `GET /api/clients`.
async fn list_clients_handler(State(state): State<Arc<HttpState>>) -> ApiResult<impl IntoResponse> {
    let clients = state.store.list_clients().await?;
    Ok(ok(json!({ "clients": clients })))
}

/// Handler for `POST /api/clients`.
async fn create_client_handler(
    State(state): State<Arc<HttpState>>,
    payload: Result<Json<NewClientRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let new_client = json_body(payload)?.validate()?;
    let client = state.store.create_client(&new_client).await?;
    info!(id = client.id, slug = %client.slug, "Created client");
    Ok((StatusCode::CREATED, ok(json!({ "client": client }))))
}

/// Handler for `POST /api/clients/{id}/devs`.
async fn assign_dev_handler(
    State(state): State<Arc<HttpState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<DevAssignment>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let client_id = path_id(id)?;
    let dev_id = json_body(payload)?.dev_id()?;
    state.store.assign_dev(client_id, dev_id).await?;
    info!(client_id, dev_id, "Assigned developer");
    Ok((
        StatusCode::CREATED,
        ok(json!({ "client_id": client_id, "dev_id": dev_id })),
    ))
}

/// Handler for `DELETE /api/clients/{id}/devs`.
async fn unassign_dev_handler(
    State(state): State<Arc<HttpState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<DevAssignment>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let client_id = path_id(id)?;
    let dev_id = json_body(payload)?.dev_id()?;
    state.store.unassign_dev(client_id, dev_id).await?;
    info!(client_id, dev_id, "Unassigned developer");
    Ok(ok(json!({ "client_id": client_id, "dev_id": dev_id })))
}

async fn list_devs_handler(State(state): State<Arc<HttpState>>) -> ApiResult<impl IntoResponse> {
    let devs = state.store.list_devs().await?;
    Ok(ok(json!({ "devs": devs })))
}

async fn create_dev_handler(
    State(state): State<Arc<HttpState>>,
    payload: Result<Json<NewDevRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let new_dev = json_body(payload)?.validate()?;
    let dev = state.store.create_dev(&new_dev).await?;
    info!(id = dev.id, "Created developer");
    Ok((StatusCode::CREATED, ok(json!({ "dev": dev }))))
}

// ── Workers ────────────────────────────────────────────────────────────────

/// Handler for `/api/ai-team/status`.
///
/// One entry per roster worker, in roster order, whatever each probe's outcome.
async fn team_status_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let workers = state.prober.probe_all(&state.roster).await;
    let summary = ProbeCounts::tally(&workers);
    ok(json!({
        "workers": workers,
        "summary": summary,
        "timestamp": Utc::now(),
    }))
}

/// Handler for `POST /api/ai-team/control`.
async fn team_control_handler(
    State(state): State<Arc<HttpState>>,
    payload: Result<Json<ControlRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let request = json_body(payload)?;
    let (worker, action) = request.validate(&state.roster)?;
    let result = state.control.send(worker, action).await?;
    Ok(ok(json!({
        "worker": worker.id,
        "action": action,
        "result": result,
    })))
}

// ── Host ───────────────────────────────────────────────────────────────────

async fn droplet_metrics_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let metrics = state.metrics.collect().await;
    ok(json!({
        "metrics": metrics,
        "timestamp": Utc::now(),
    }))
}
