//! Campaign orchestrator: long-running worker pools per capability family,
//! campaign managers that keep them topped up, and derived campaign stats.

/// Family vocabulary, campaign specs, and outcome types.
pub mod family;
/// The unit-of-work handler contract and registry.
pub mod handler;
/// The orchestrator engine.
pub mod orchestrator;
/// In-process simulation handlers.
pub mod sim;

pub use family::{
    CampaignOutcome, CampaignSpec, CampaignStats, Family, FamilyActivity, OrchestratorOverview,
    StartOutcome, StopOutcome, WorkerParams,
};
pub use handler::{FamilyHandler, HandlerRegistry, UnitContext};
pub use orchestrator::Orchestrator;
