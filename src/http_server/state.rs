//! Shared handler state

use std::sync::Arc;

use crate::gatekeeper::Gatekeeper;
use crate::observability::MetricsRegistry;
use crate::store::{DocumentStore, StoreHandle, StoreResult};

/// State shared by every route
#[derive(Debug)]
pub struct AppState {
    pub store: StoreHandle,
    pub gatekeeper: Gatekeeper,
    pub metrics: Arc<MetricsRegistry>,
}

impl AppState {
    /// Gatekeeper and handlers share one metrics registry
    pub fn new(store: StoreHandle) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        Self {
            store,
            gatekeeper: Gatekeeper::new(Arc::clone(&metrics)),
            metrics,
        }
    }

    /// The connected store, or `NotConnected`
    pub fn store(&self) -> StoreResult<Arc<dyn DocumentStore>> {
        self.store.store()
    }
}
