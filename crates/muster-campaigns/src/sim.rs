//! In-process simulation handlers.
//!
//! These handlers model each family's workload as paced local counters so
//! the orchestrator can be exercised end to end without an agent fleet.
//! None of them touches the network; deployments supply real handlers
//! through [`crate::HandlerRegistry`].

use crate::family::{Family, WorkerParams};
use crate::handler::{FamilyHandler, UnitContext};
use async_trait::async_trait;
use muster_core::{MusterError, MusterResult};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::trace;

/// Hash-computation simulation: one unit batch is a short SHA-256 nonce
/// loop, counted as one attempt per digest.
pub struct HashLoopMiner;

#[async_trait]
impl FamilyHandler for HashLoopMiner {
    fn family(&self) -> Family {
        Family::Mining
    }

    async fn run_unit(&self, ctx: UnitContext<'_>) -> MusterResult<u64> {
        let batch = 8 * u64::from(ctx.params.intensity.clamp(1, 100));
        let algorithm = ctx.params.algorithm.as_deref().unwrap_or("cryptonight");
        let mut best: u8 = u8::MAX;
        for nonce in 0..batch {
            let mut hasher = Sha256::new();
            hasher.update(algorithm.as_bytes());
            hasher.update(ctx.agent_id.as_bytes());
            hasher.update(ctx.units_done.to_le_bytes());
            hasher.update(nonce.to_le_bytes());
            let digest = hasher.finalize();
            best = best.min(digest[0]);
        }
        trace!(
            agent_id = ctx.agent_id,
            batch,
            best_leading_byte = best,
            "hash batch done"
        );
        Ok(batch)
    }

    fn pace(&self, _params: &WorkerParams) -> Duration {
        Duration::from_millis(250)
    }
}

/// Request-flood simulation: counts paced dry-run request units against a
/// named target without opening a single connection.
pub struct DryRunFlooder;

#[async_trait]
impl FamilyHandler for DryRunFlooder {
    fn family(&self) -> Family {
        Family::Flood
    }

    fn validate(&self, params: &WorkerParams) -> MusterResult<()> {
        match params.target.as_deref() {
            Some(t) if !t.is_empty() => Ok(()),
            _ => Err(MusterError::Validation(
                "flood workers require a target".to_string(),
            )),
        }
    }

    async fn run_unit(&self, ctx: UnitContext<'_>) -> MusterResult<u64> {
        trace!(
            agent_id = ctx.agent_id,
            target = ctx.params.target.as_deref().unwrap_or_default(),
            unit = ctx.units_done,
            "dry-run request unit"
        );
        Ok(1)
    }

    fn pace(&self, params: &WorkerParams) -> Duration {
        // Higher intensity, shorter pauses.
        Duration::from_millis(1000 / u64::from(params.intensity.clamp(1, 100)))
    }
}

/// Search-traffic simulation: walks the keyword's query variations in a
/// deterministic rotation, one search unit per step.
pub struct QueryWalker;

#[async_trait]
impl FamilyHandler for QueryWalker {
    fn family(&self) -> Family {
        Family::Boost
    }

    fn validate(&self, params: &WorkerParams) -> MusterResult<()> {
        match params.keyword.as_deref() {
            Some(k) if !k.is_empty() => Ok(()),
            _ => Err(MusterError::Validation(
                "boost workers require a keyword".to_string(),
            )),
        }
    }

    async fn run_unit(&self, ctx: UnitContext<'_>) -> MusterResult<u64> {
        let keyword = ctx.params.keyword.as_deref().unwrap_or_default();
        let variations = query_variations(keyword);
        let index = usize::try_from(ctx.units_done).unwrap_or(0) % variations.len();
        trace!(
            agent_id = ctx.agent_id,
            query = %variations[index],
            "search unit"
        );
        Ok(1)
    }

    fn pace(&self, _params: &WorkerParams) -> Duration {
        Duration::from_secs(2)
    }
}

/// The query variations a boost worker rotates through for a keyword.
pub fn query_variations(keyword: &str) -> Vec<String> {
    vec![
        keyword.to_string(),
        format!("{keyword} review"),
        format!("best {keyword}"),
        format!("{keyword} price"),
        format!("{keyword} alternatives"),
        format!("buy {keyword}"),
        format!("how to use {keyword}"),
        format!("{keyword} benefits"),
    ]
}
