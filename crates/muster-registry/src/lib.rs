//! Agent registry: identity, registration, and derived liveness for the fleet.

/// Agent records and registration profiles.
pub mod agent;
/// The registry service.
pub mod registry;
/// Storage backends for agent records.
pub mod store;

pub use agent::{AgentProfile, AgentRecord, FleetStats};
pub use registry::Registry;
pub use store::{FileRegistryStore, InMemoryRegistryStore, RegistryStore};
