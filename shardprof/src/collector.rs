//! # Profile Collection
//!
//! Fans a fetch out to every shard in parallel and assembles the
//! [`ClusterProfile`] handed to the admin layer.
//!
//! ## Failure Isolation
//!
//! Each shard gets its own timeout. A shard that times out or whose task is
//! gone is left out of the result and recorded as a
//! [`CollectionDiagnostic`]; only when no shard answers does the whole call
//! fail with [`ProfilerError::AllShardsUnavailable`].
//!
//! ## Consistency
//!
//! There is no global pause: each shard answers from its own task at its own
//! moment, so a cluster profile is a collage of near-simultaneous per-shard
//! windows. Output is ordered by shard index regardless of completion order.

use std::time::Duration;

use log::{debug, warn};
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::domain::{ProfilerError, ShardId};
use crate::profile_data::{ClusterProfile, CollectionDiagnostic, ShardProfile};
use crate::profiling::ShardHandle;

#[derive(Debug, Clone)]
pub struct ProfileCollector {
    shards: Vec<ShardHandle>,
    per_shard_timeout: Duration,
}

impl ProfileCollector {
    #[must_use]
    pub fn new(mut shards: Vec<ShardHandle>, per_shard_timeout: Duration) -> Self {
        shards.sort_by_key(ShardHandle::shard);
        Self { shards, per_shard_timeout }
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[must_use]
    pub fn shard_ids(&self) -> Vec<ShardId> {
        self.shards.iter().map(ShardHandle::shard).collect()
    }

    /// Fetch every shard's profile.
    ///
    /// # Errors
    /// [`ProfilerError::AllShardsUnavailable`] when no shard answered
    /// (including when there are no shards at all).
    pub async fn collect_all(&self) -> Result<ClusterProfile, ProfilerError> {
        let mut requests = JoinSet::new();
        for handle in &self.shards {
            let handle = handle.clone();
            let limit = self.per_shard_timeout;
            requests.spawn(async move {
                let shard = handle.shard();
                (shard, fetch_with_timeout(&handle, limit).await)
            });
        }

        let mut shards: Vec<ShardProfile> = Vec::with_capacity(self.shards.len());
        let mut diagnostics: Vec<CollectionDiagnostic> = Vec::new();

        while let Some(joined) = requests.join_next().await {
            match joined {
                Ok((_, Ok(profile))) => shards.push(profile),
                Ok((shard, Err(err))) => {
                    warn!("Omitting {shard} from cluster profile: {err}");
                    diagnostics
                        .push(CollectionDiagnostic { shard_id: shard, reason: err.to_string() });
                }
                Err(join_err) => {
                    warn!("Profile request task failed: {join_err}");
                }
            }
        }

        // A request task that died takes its shard id with it; recover it
        // as the shards that neither answered nor were diagnosed.
        for shard in self.shard_ids() {
            let answered = shards.iter().any(|p| p.shard_id == shard);
            let diagnosed = diagnostics.iter().any(|d| d.shard_id == shard);
            if !answered && !diagnosed {
                diagnostics.push(CollectionDiagnostic {
                    shard_id: shard,
                    reason: "profile request task failed".to_string(),
                });
            }
        }

        if shards.is_empty() {
            return Err(ProfilerError::AllShardsUnavailable { attempted: self.shards.len() });
        }

        shards.sort_by_key(|p| p.shard_id);
        diagnostics.sort_by_key(|d| d.shard_id);
        debug!("Collected {} shard profiles ({} omitted)", shards.len(), diagnostics.len());
        Ok(ClusterProfile { shards, diagnostics })
    }

    /// Fetch a single shard's profile.
    ///
    /// # Errors
    /// [`ProfilerError::UnknownShard`] for an id outside the shard set,
    /// [`ProfilerError::ShardUnavailable`] on timeout or a stopped task.
    pub async fn collect_shard(&self, shard: ShardId) -> Result<ShardProfile, ProfilerError> {
        let handle = self
            .shards
            .iter()
            .find(|h| h.shard() == shard)
            .ok_or(ProfilerError::UnknownShard(shard))?;
        fetch_with_timeout(handle, self.per_shard_timeout).await
    }
}

async fn fetch_with_timeout(
    handle: &ShardHandle,
    limit: Duration,
) -> Result<ShardProfile, ProfilerError> {
    match timeout(limit, handle.snapshot()).await {
        Ok(report) => Ok(report?.into_profile()),
        Err(_) => Err(ProfilerError::ShardUnavailable {
            shard: handle.shard(),
            reason: format!("timed out after {}ms", limit.as_millis()),
        }),
    }
}
