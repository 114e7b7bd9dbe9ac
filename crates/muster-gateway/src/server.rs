use crate::routes;
use axum::{
    routing::{get, post},
    Router,
};
use muster_campaigns::Orchestrator;
use muster_queue::CommandQueue;
use muster_registry::Registry;
use muster_vault::Vault;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub registry: Arc<Registry>,
    pub queue: Arc<CommandQueue>,
    pub vault: Arc<Vault>,
    pub orchestrator: Arc<Orchestrator>,
}

/// The fleet dispatch server.
pub struct GatewayServer;

impl GatewayServer {
    /// Builds the router over the injected services.
    pub fn build(
        registry: Arc<Registry>,
        queue: Arc<CommandQueue>,
        vault: Arc<Vault>,
        orchestrator: Arc<Orchestrator>,
    ) -> Router {
        let state = Arc::new(AppState {
            registry,
            queue,
            vault,
            orchestrator,
        });

        Router::new()
            .route("/health", get(routes::health_handler))
            // Agent-facing
            .route("/agents/register", post(routes::register_handler))
            .route("/agents/{id}/heartbeat", post(routes::heartbeat_handler))
            .route("/commands/pending", get(routes::pending_handler))
            .route("/commands/{id}/begin", post(routes::begin_handler))
            .route("/commands/{id}/report", post(routes::report_handler))
            .route(
                "/artifacts",
                post(routes::artifact_store_handler).get(routes::artifact_list_handler),
            )
            // Operator-facing
            .route("/agents", get(routes::list_agents_handler))
            .route("/agents/stats", get(routes::fleet_stats_handler))
            .route("/agents/{id}", get(routes::get_agent_handler))
            .route("/agents/{id}/commands", post(routes::enqueue_handler))
            .route("/commands/{id}/output", get(routes::output_handler))
            .route(
                "/campaigns/{family}/start",
                post(routes::campaign_start_handler),
            )
            .route(
                "/campaigns/{family}/stop",
                post(routes::campaign_stop_handler),
            )
            .route(
                "/campaigns/{family}/stats",
                get(routes::campaign_stats_handler),
            )
            .route(
                "/artifacts/{id}/download",
                get(routes::artifact_download_handler),
            )
            .route("/overview", get(routes::overview_handler))
            .with_state(state)
    }
}
