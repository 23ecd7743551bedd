use std::sync::Arc;

use crate::coordinator::WriteCoordinator;
use crate::core::SessionStats;
use crate::hub::EventHub;
use crate::status::StatusAggregator;
use crate::storage::Store;
use crate::workload::WorkloadGenerator;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub hub: Arc<EventHub>,
    pub coordinator: Arc<WriteCoordinator>,
    pub workload: Arc<WorkloadGenerator>,
    pub aggregator: Arc<StatusAggregator>,
}

impl AppState {
    /// Wires every component around one open store.
    pub fn new(store: Arc<Store>) -> Self {
        let stats = Arc::new(SessionStats::new());
        let hub = Arc::new(EventHub::new());
        let coordinator = Arc::new(WriteCoordinator::new(
            store.clone(),
            hub.clone(),
            stats.clone(),
        ));
        let workload = Arc::new(WorkloadGenerator::new(
            coordinator.clone(),
            store.clone(),
            stats.clone(),
        ));
        let aggregator = Arc::new(StatusAggregator::new(store.clone(), stats, workload.clone()));

        Self {
            store,
            hub,
            coordinator,
            workload,
            aggregator,
        }
    }
}
