//! HTTP dispatch surface for the muster fleet.
//!
//! Thin composition layer over the registry, command queue, vault and
//! orchestrator. Agents register, poll and report over plain JSON; the
//! same router carries the operator surface (fleet stats, campaign
//! control, artifact retrieval, overview).

pub mod routes;
pub mod server;

pub use server::{AppState, GatewayServer};
