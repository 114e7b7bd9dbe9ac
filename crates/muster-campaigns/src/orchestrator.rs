use crate::family::{
    running_secs, CampaignOutcome, CampaignSpec, CampaignStats, Family, FamilyActivity,
    OrchestratorOverview, StartOutcome, StopOutcome, WorkerParams,
};
use crate::handler::{FamilyHandler, HandlerRegistry, UnitContext};
use chrono::{DateTime, Utc};
use muster_core::{MusterError, MusterResult};
use muster_registry::Registry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct WorkerEntry {
    params: WorkerParams,
    cancel: CancellationToken,
    units: Arc<AtomicU64>,
    started_at: DateTime<Utc>,
    /// Name of the campaign that started this worker, if any.
    campaign: Option<String>,
}

struct CampaignEntry {
    spec: CampaignSpec,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
}

/// Runs worker pools per capability family and the campaign managers that
/// keep them topped up.
///
/// Invariants: at most one worker per (agent, family); total workers never
/// exceed the ceiling; a worker stops only through its cancellation token.
/// Checking the worker table and spawning happen under one lock
/// acquisition, so concurrent starts for the same key cannot both spawn.
pub struct Orchestrator {
    handlers: HandlerRegistry,
    registry: Arc<Registry>,
    workers: Mutex<HashMap<(String, Family), WorkerEntry>>,
    campaigns: Mutex<HashMap<String, CampaignEntry>>,
    worker_ceiling: usize,
    campaign_cycle: Duration,
}

impl Orchestrator {
    pub fn new(
        handlers: HandlerRegistry,
        registry: Arc<Registry>,
        worker_ceiling: usize,
        campaign_cycle: Duration,
    ) -> Self {
        Self {
            handlers,
            registry,
            workers: Mutex::new(HashMap::new()),
            campaigns: Mutex::new(HashMap::new()),
            worker_ceiling,
            campaign_cycle,
        }
    }

    /// Starts a worker for `(agent, family)`. Starting an already-running
    /// pair reports [`StartOutcome::AlreadyRunning`] and changes nothing.
    pub async fn start_worker(
        &self,
        family: Family,
        agent_id: &str,
        params: WorkerParams,
    ) -> MusterResult<StartOutcome> {
        self.start_worker_inner(family, agent_id, params, None).await
    }

    async fn start_worker_inner(
        &self,
        family: Family,
        agent_id: &str,
        params: WorkerParams,
        campaign: Option<String>,
    ) -> MusterResult<StartOutcome> {
        let handler = self.handlers.get(family).ok_or_else(|| {
            MusterError::Validation(format!(
                "no handler registered for family {}",
                family.as_str()
            ))
        })?;
        handler.validate(&params)?;
        let agent = self.registry.get(agent_id).await?;
        if !family.permitted_by(&agent.capabilities) {
            return Err(MusterError::CapabilityMismatch(format!(
                "agent {agent_id} did not declare the capability required by {} workers",
                family.as_str()
            )));
        }

        let key = (agent_id.to_string(), family);
        let mut workers = self.workers.lock().await;
        if workers.contains_key(&key) {
            return Ok(StartOutcome::AlreadyRunning);
        }
        if workers.len() >= self.worker_ceiling {
            return Err(MusterError::Capacity(format!(
                "{} of {} workers running",
                workers.len(),
                self.worker_ceiling
            )));
        }

        let cancel = CancellationToken::new();
        let units = Arc::new(AtomicU64::new(0));
        // Spawn while the table lock is held; registration and spawn form
        // one atomic step.
        tokio::spawn(run_worker(
            handler,
            family,
            agent_id.to_string(),
            params.clone(),
            Arc::clone(&units),
            cancel.clone(),
        ));
        workers.insert(
            key,
            WorkerEntry {
                params,
                cancel,
                units,
                started_at: Utc::now(),
                campaign,
            },
        );
        drop(workers);
        info!(agent_id, family = family.as_str(), "worker started");
        Ok(StartOutcome::Started)
    }

    /// Stops the worker for `(agent, family)` by firing its cancellation
    /// token. Stopping an idle pair reports [`StopOutcome::NotRunning`].
    /// A stop followed by a start on the same pair is always accepted.
    pub async fn stop_worker(&self, family: Family, agent_id: &str) -> MusterResult<StopOutcome> {
        let key = (agent_id.to_string(), family);
        let removed = { self.workers.lock().await.remove(&key) };
        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                info!(agent_id, family = family.as_str(), "worker stopped");
                Ok(StopOutcome::Stopped)
            }
            None => Ok(StopOutcome::NotRunning),
        }
    }

    /// Launches a campaign manager task for `spec`. Campaign names are
    /// unique among active campaigns; relaunching an active name reports
    /// [`CampaignOutcome::AlreadyExists`].
    pub async fn start_campaign(self: &Arc<Self>, spec: CampaignSpec) -> MusterResult<CampaignOutcome> {
        if spec.name.is_empty() {
            return Err(MusterError::Validation(
                "campaign name is required".to_string(),
            ));
        }
        if spec.agent_count == 0 {
            return Err(MusterError::Validation(
                "campaign agent_count must be at least 1".to_string(),
            ));
        }
        if spec.duration.is_zero() {
            return Err(MusterError::Validation(
                "campaign duration must be positive".to_string(),
            ));
        }
        let handler = self.handlers.get(spec.family).ok_or_else(|| {
            MusterError::Validation(format!(
                "no handler registered for family {}",
                spec.family.as_str()
            ))
        })?;
        handler.validate(&spec.params)?;

        let mut campaigns = self.campaigns.lock().await;
        if campaigns.contains_key(&spec.name) {
            return Ok(CampaignOutcome::AlreadyExists);
        }
        let cancel = CancellationToken::new();
        let name = spec.name.clone();
        tokio::spawn(run_campaign(Arc::clone(self), spec.clone(), cancel.clone()));
        campaigns.insert(
            name.clone(),
            CampaignEntry {
                spec,
                cancel,
                started_at: Utc::now(),
            },
        );
        drop(campaigns);
        info!(campaign = %name, "campaign started");
        Ok(CampaignOutcome::Started)
    }

    /// Requests a campaign stop. The manager drains the workers it started
    /// and the campaign disappears from stats.
    pub async fn stop_campaign(&self, name: &str) -> MusterResult<StopOutcome> {
        let removed = { self.campaigns.lock().await.remove(name) };
        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                info!(campaign = name, "campaign stop requested");
                Ok(StopOutcome::Stopped)
            }
            None => Ok(StopOutcome::NotRunning),
        }
    }

    /// Stats for an active campaign, derived by cross-referencing the live
    /// worker table against the campaign's parameters.
    pub async fn campaign_stats(&self, name: &str) -> MusterResult<CampaignStats> {
        let (spec, started_at) = {
            let campaigns = self.campaigns.lock().await;
            let entry = campaigns
                .get(name)
                .ok_or_else(|| MusterError::NotFound(format!("campaign {name}")))?;
            (entry.spec.clone(), entry.started_at)
        };
        let workers = self.workers.lock().await;
        let mut active_workers = 0;
        let mut units_produced = 0;
        for ((_, family), entry) in workers.iter() {
            if *family == spec.family && params_match(&entry.params, &spec.params) {
                active_workers += 1;
                units_produced += entry.units.load(Ordering::Relaxed);
            }
        }
        Ok(CampaignStats {
            campaign: name.to_string(),
            family: spec.family,
            keyword: spec.params.keyword.clone(),
            active_workers,
            units_produced,
            running_secs: running_secs(started_at, Utc::now()),
            status: "active".to_string(),
        })
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    pub async fn is_running(&self, family: Family, agent_id: &str) -> bool {
        self.workers
            .lock()
            .await
            .contains_key(&(agent_id.to_string(), family))
    }

    /// Snapshot of per-family activity and active campaigns.
    pub async fn overview(&self) -> OrchestratorOverview {
        let workers = self.workers.lock().await;
        let total_workers = workers.len();
        let mut by_family: HashMap<String, FamilyActivity> = HashMap::new();
        for ((_, family), entry) in workers.iter() {
            let slot = by_family.entry(family.as_str().to_string()).or_default();
            slot.workers += 1;
            slot.units += entry.units.load(Ordering::Relaxed);
        }
        drop(workers);

        let names: Vec<String> = self.campaigns.lock().await.keys().cloned().collect();
        let mut campaigns = Vec::new();
        for name in names {
            // A campaign may end between listing and stats; skip it then.
            if let Ok(stats) = self.campaign_stats(&name).await {
                campaigns.push(stats);
            }
        }
        campaigns.sort_by(|a, b| a.campaign.cmp(&b.campaign));

        OrchestratorOverview {
            total_workers,
            worker_ceiling: self.worker_ceiling,
            by_family,
            campaigns,
        }
    }

    /// Cancels every campaign and worker. Used on daemon shutdown.
    pub async fn shutdown(&self) {
        let campaigns: Vec<CampaignEntry> = {
            self.campaigns.lock().await.drain().map(|(_, e)| e).collect()
        };
        for entry in &campaigns {
            entry.cancel.cancel();
        }
        let workers: Vec<WorkerEntry> = {
            self.workers.lock().await.drain().map(|(_, e)| e).collect()
        };
        for entry in &workers {
            entry.cancel.cancel();
        }
        info!(
            workers = workers.len(),
            campaigns = campaigns.len(),
            "orchestrator shut down"
        );
    }

    /// One campaign cycle: enumerate eligible agents and top workers up to
    /// the campaign's agent count. Returns how many workers were started.
    async fn campaign_cycle_pass(
        &self,
        spec: &CampaignSpec,
        started: &mut HashSet<String>,
    ) -> MusterResult<usize> {
        let eligible: Vec<_> = self
            .registry
            .online_agents()
            .await?
            .into_iter()
            .filter(|a| spec.family.permitted_by(&a.capabilities))
            .take(spec.agent_count)
            .collect();

        let mut new_workers = 0;
        for agent in eligible {
            match self
                .start_worker_inner(
                    spec.family,
                    &agent.id,
                    spec.params.clone(),
                    Some(spec.name.clone()),
                )
                .await
            {
                Ok(StartOutcome::Started) => {
                    started.insert(agent.id);
                    new_workers += 1;
                }
                Ok(StartOutcome::AlreadyRunning) => {}
                Err(MusterError::Capacity(reason)) => {
                    warn!(campaign = %spec.name, %reason, "worker ceiling reached; cycle truncated");
                    break;
                }
                Err(e) => {
                    warn!(
                        campaign = %spec.name,
                        agent_id = %agent.id,
                        error = %e,
                        "campaign worker start failed"
                    );
                }
            }
        }
        Ok(new_workers)
    }
}

fn params_match(worker: &WorkerParams, campaign: &WorkerParams) -> bool {
    worker.keyword == campaign.keyword && worker.target == campaign.target
}

/// Worker loop: produce a unit batch, then pace. The sleep raced against
/// the cancellation token is the cooperative-cancellation point; handler
/// errors are logged and the loop continues.
async fn run_worker(
    handler: Arc<dyn FamilyHandler>,
    family: Family,
    agent_id: String,
    params: WorkerParams,
    units: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    debug!(agent_id = %agent_id, family = family.as_str(), "worker loop entered");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let units_done = units.load(Ordering::Relaxed);
        match handler
            .run_unit(UnitContext {
                agent_id: &agent_id,
                params: &params,
                units_done,
            })
            .await
        {
            Ok(produced) => {
                units.fetch_add(produced, Ordering::Relaxed);
            }
            Err(e) => warn!(
                agent_id = %agent_id,
                family = family.as_str(),
                error = %e,
                "unit failed; worker continues"
            ),
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(handler.pace(&params)) => {}
        }
    }
    debug!(agent_id = %agent_id, family = family.as_str(), "worker stopped");
}

/// Campaign manager loop: top up workers each cycle until the duration
/// elapses or the campaign is stopped, then drain the workers it started.
async fn run_campaign(orchestrator: Arc<Orchestrator>, spec: CampaignSpec, cancel: CancellationToken) {
    let deadline = tokio::time::Instant::now() + spec.duration;
    let mut started: HashSet<String> = HashSet::new();
    loop {
        match orchestrator.campaign_cycle_pass(&spec, &mut started).await {
            Ok(0) => {}
            Ok(new_workers) => {
                info!(campaign = %spec.name, new_workers, "campaign cycle topped up");
            }
            Err(e) => warn!(campaign = %spec.name, error = %e, "campaign cycle failed"),
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => break,
            _ = tokio::time::sleep(orchestrator.campaign_cycle) => {}
        }
    }
    for agent_id in &started {
        let _ = orchestrator.stop_worker(spec.family, agent_id).await;
    }
    // A stop request already freed the name; removing again could hit a
    // relaunched campaign under the same name.
    if !cancel.is_cancelled() {
        orchestrator.campaigns.lock().await.remove(&spec.name);
    }
    info!(
        campaign = %spec.name,
        workers_drained = started.len(),
        "campaign ended"
    );
}
