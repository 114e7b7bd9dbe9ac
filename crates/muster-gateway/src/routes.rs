use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use muster_campaigns::{CampaignSpec, Family, WorkerParams};
use muster_core::{derive_agent_id, CommandKind, MusterError};
use muster_queue::CommandReport;
use muster_registry::{AgentProfile, AgentRecord};
use muster_vault::ArtifactKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// How many records the overview surfaces per recency list.
const OVERVIEW_RECENT: usize = 10;

fn default_campaign_agent_count() -> usize {
    10
}

fn default_campaign_duration_secs() -> u64 {
    3600
}

// --- Request / response bodies ---

/// Body for `POST /agents/register`.
///
/// Agents either present the identifier they derived locally or send a
/// `machine_token` and let the server derive it from the hostname.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub machine_token: Option<String>,
    #[serde(flatten)]
    pub profile: AgentProfile,
}

/// Body for `POST /agents/{id}/commands`.
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub kind: CommandKind,
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Query string for `GET /commands/pending`.
#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// Body for `POST /campaigns/{family}/start` and `.../stop`.
///
/// Exactly one of `agent_id` (single worker) or `campaign` (named
/// multi-agent campaign) selects the operation; the rest are worker
/// parameters.
#[derive(Debug, Deserialize)]
pub struct CampaignRequest {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub campaign: Option<String>,
    #[serde(flatten)]
    pub params: WorkerParams,
    #[serde(default = "default_campaign_agent_count")]
    pub agent_count: usize,
    #[serde(default = "default_campaign_duration_secs")]
    pub duration_secs: u64,
}

/// Query string for `GET /campaigns/{family}/stats`.
#[derive(Debug, Deserialize)]
pub struct CampaignStatsQuery {
    #[serde(default)]
    pub name: Option<String>,
}

/// Body for `POST /artifacts`.
#[derive(Debug, Deserialize)]
pub struct ArtifactUpload {
    pub agent_id: String,
    pub kind: ArtifactKind,
    pub payload_b64: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Query string for `GET /artifacts`.
#[derive(Debug, Deserialize)]
pub struct ArtifactListQuery {
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// An agent record plus its derived liveness, as served to operators.
#[derive(Debug, Serialize)]
pub struct AgentView {
    #[serde(flatten)]
    pub agent: AgentRecord,
    pub online: bool,
}

// --- Error mapping ---

/// Maps the crate error taxonomy onto HTTP statuses.
fn error_response(err: &MusterError) -> Response {
    let status = match err {
        MusterError::NotFound(_) => StatusCode::NOT_FOUND,
        MusterError::Validation(_) => StatusCode::BAD_REQUEST,
        MusterError::InvalidTransition(_) => StatusCode::CONFLICT,
        MusterError::CapabilityMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MusterError::Capacity(_) => StatusCode::TOO_MANY_REQUESTS,
        MusterError::Sealing(_)
        | MusterError::Storage(_)
        | MusterError::Json(_)
        | MusterError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %err, "request failed");
    }
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

fn ok_json<T: Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

// --- Handlers ---

pub async fn health_handler() -> Response {
    ok_json(serde_json::json!({"status": "ok", "service": "muster"}))
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let id = match req.id {
        Some(id) => id,
        None => derive_agent_id(
            &req.profile.hostname,
            req.machine_token.as_deref().unwrap_or_default(),
        ),
    };
    match state.registry.register(&id, req.profile).await {
        Ok(agent) => {
            let online = state.registry.is_online(&agent);
            ok_json(AgentView { agent, online })
        }
        Err(e) => error_response(&e),
    }
}

pub async fn heartbeat_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.registry.heartbeat(&id).await {
        Ok(agent) => {
            let online = state.registry.is_online(&agent);
            ok_json(AgentView { agent, online })
        }
        Err(e) => error_response(&e),
    }
}

pub async fn list_agents_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.registry.list().await {
        Ok(agents) => {
            let views: Vec<AgentView> = agents
                .into_iter()
                .map(|agent| {
                    let online = state.registry.is_online(&agent);
                    AgentView { agent, online }
                })
                .collect();
            ok_json(views)
        }
        Err(e) => error_response(&e),
    }
}

pub async fn get_agent_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.registry.get(&id).await {
        Ok(agent) => {
            let online = state.registry.is_online(&agent);
            ok_json(AgentView { agent, online })
        }
        Err(e) => error_response(&e),
    }
}

pub async fn fleet_stats_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.registry.fleet_stats().await {
        Ok(stats) => ok_json(stats),
        Err(e) => error_response(&e),
    }
}

pub async fn enqueue_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<EnqueueRequest>,
) -> Response {
    match state
        .queue
        .enqueue(&id, req.kind, &req.name, req.params)
        .await
    {
        Ok(command) => ok_json(command),
        Err(e) => error_response(&e),
    }
}

pub async fn pending_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PendingQuery>,
) -> Response {
    match state.queue.poll_pending(query.agent_id.as_deref()).await {
        Ok(commands) => ok_json(commands),
        Err(e) => error_response(&e),
    }
}

pub async fn begin_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.queue.begin(id).await {
        Ok(command) => ok_json(command),
        Err(e) => error_response(&e),
    }
}

pub async fn report_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(report): Json<CommandReport>,
) -> Response {
    match state.queue.report(id, report).await {
        Ok(command) => ok_json(command),
        Err(e) => error_response(&e),
    }
}

pub async fn output_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.queue.output(id).await {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            (StatusCode::OK, text).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn campaign_start_handler(
    State(state): State<Arc<AppState>>,
    Path(family): Path<String>,
    Json(req): Json<CampaignRequest>,
) -> Response {
    let family: Family = match family.parse() {
        Ok(f) => f,
        Err(e) => return error_response(&e),
    };
    if let Some(agent_id) = req.agent_id {
        return match state
            .orchestrator
            .start_worker(family, &agent_id, req.params)
            .await
        {
            Ok(outcome) => ok_json(serde_json::json!({"status": outcome})),
            Err(e) => error_response(&e),
        };
    }
    if let Some(name) = req.campaign {
        let spec = CampaignSpec {
            name,
            family,
            params: req.params,
            agent_count: req.agent_count,
            duration: Duration::from_secs(req.duration_secs),
        };
        return match state.orchestrator.start_campaign(spec).await {
            Ok(outcome) => ok_json(serde_json::json!({"status": outcome})),
            Err(e) => error_response(&e),
        };
    }
    error_response(&MusterError::Validation(
        "either agent_id or campaign is required".to_string(),
    ))
}

pub async fn campaign_stop_handler(
    State(state): State<Arc<AppState>>,
    Path(family): Path<String>,
    Json(req): Json<CampaignRequest>,
) -> Response {
    let family: Family = match family.parse() {
        Ok(f) => f,
        Err(e) => return error_response(&e),
    };
    if let Some(agent_id) = req.agent_id {
        return match state.orchestrator.stop_worker(family, &agent_id).await {
            Ok(outcome) => ok_json(serde_json::json!({"status": outcome})),
            Err(e) => error_response(&e),
        };
    }
    if let Some(name) = req.campaign {
        return match state.orchestrator.stop_campaign(&name).await {
            Ok(outcome) => ok_json(serde_json::json!({"status": outcome})),
            Err(e) => error_response(&e),
        };
    }
    error_response(&MusterError::Validation(
        "either agent_id or campaign is required".to_string(),
    ))
}

pub async fn campaign_stats_handler(
    State(state): State<Arc<AppState>>,
    Path(family): Path<String>,
    Query(query): Query<CampaignStatsQuery>,
) -> Response {
    let family: Family = match family.parse() {
        Ok(f) => f,
        Err(e) => return error_response(&e),
    };
    match query.name {
        Some(name) => match state.orchestrator.campaign_stats(&name).await {
            Ok(stats) if stats.family == family => ok_json(stats),
            Ok(_) => error_response(&MusterError::NotFound(format!(
                "campaign {name} is not a {} campaign",
                family.as_str()
            ))),
            Err(e) => error_response(&e),
        },
        None => {
            let overview = state.orchestrator.overview().await;
            let activity = overview
                .by_family
                .get(family.as_str())
                .cloned()
                .unwrap_or_default();
            ok_json(serde_json::json!({
                "family": family.as_str(),
                "workers": activity.workers,
                "units": activity.units,
            }))
        }
    }
}

pub async fn artifact_store_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ArtifactUpload>,
) -> Response {
    let payload = match BASE64.decode(req.payload_b64.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            return error_response(&MusterError::Validation(format!(
                "payload_b64 is not valid base64: {e}"
            )))
        }
    };
    match state
        .vault
        .put(
            &req.agent_id,
            req.kind,
            &payload,
            req.filename,
            req.description,
        )
        .await
    {
        Ok(meta) => ok_json(meta),
        Err(e) => error_response(&e),
    }
}

pub async fn artifact_list_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArtifactListQuery>,
) -> Response {
    match state.vault.list(query.agent_id.as_deref()).await {
        Ok(metas) => ok_json(metas),
        Err(e) => error_response(&e),
    }
}

pub async fn artifact_download_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.vault.open(id).await {
        Ok((meta, bytes)) => (
            StatusCode::OK,
            [
                (
                    header::CONTENT_TYPE,
                    "application/octet-stream".to_string(),
                ),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", meta.download_name()),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn overview_handler(State(state): State<Arc<AppState>>) -> Response {
    let fleet = match state.registry.fleet_stats().await {
        Ok(stats) => stats,
        Err(e) => return error_response(&e),
    };
    let commands = match state.queue.stats().await {
        Ok(stats) => stats,
        Err(e) => return error_response(&e),
    };
    let recent_commands = match state.queue.recent(OVERVIEW_RECENT).await {
        Ok(commands) => commands,
        Err(e) => return error_response(&e),
    };
    let recent_artifacts = match state.vault.recent(OVERVIEW_RECENT).await {
        Ok(metas) => metas,
        Err(e) => return error_response(&e),
    };
    let orchestrator = state.orchestrator.overview().await;
    ok_json(serde_json::json!({
        "fleet": fleet,
        "commands": commands,
        "orchestrator": orchestrator,
        "recent_commands": recent_commands,
        "recent_artifacts": recent_artifacts,
    }))
}
