//! On-demand reconciliation of session counters against store-of-record
//! aggregates and the replica artifact on disk. Pure read: nothing here
//! mutates the store or the counters.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::SessionStats;
use crate::storage::Store;
use crate::workload::WorkloadGenerator;

/// The `/test/status` payload. `replica_artifact_size` is `null` while the
/// artifact is momentarily unreadable (e.g. mid-replication); the snapshot
/// itself never fails for that reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub is_running: bool,
    pub writes_per_second: Option<f64>,
    pub users_created_this_session: u64,
    pub posts_created_this_session: u64,
    pub posts_updated_this_session: u64,
    pub posts_deleted_this_session: u64,
    pub workload_errors_this_session: u64,
    pub total_users: u64,
    pub total_posts: u64,
    pub replica_artifact_size: Option<u64>,
}

pub struct StatusAggregator {
    store: Arc<Store>,
    stats: Arc<SessionStats>,
    workload: Arc<WorkloadGenerator>,
}

impl StatusAggregator {
    pub fn new(
        store: Arc<Store>,
        stats: Arc<SessionStats>,
        workload: Arc<WorkloadGenerator>,
    ) -> Self {
        Self {
            store,
            stats,
            workload,
        }
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let counters = self.stats.counters();
        let counts = self.store.counts().await;
        let workload = self.workload.status().await;
        let replica_artifact_size = self.store.artifact_size().await;

        StatusSnapshot {
            is_running: workload.running,
            writes_per_second: workload.rate,
            users_created_this_session: counters.users_created,
            posts_created_this_session: counters.posts_created,
            posts_updated_this_session: counters.posts_updated,
            posts_deleted_this_session: counters.posts_deleted,
            workload_errors_this_session: counters.workload_errors,
            total_users: counts.users,
            total_posts: counts.posts,
            replica_artifact_size,
        }
    }
}
