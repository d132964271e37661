use std::sync::Arc;

use crate::config::Config;
use crate::observability::Metrics;
use crate::scheduler::MaintenanceScheduler;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub scheduler: MaintenanceScheduler,
    pub store: Arc<dyn Store>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        scheduler: MaintenanceScheduler,
        store: Arc<dyn Store>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            scheduler,
            store,
            metrics,
        }
    }
}
