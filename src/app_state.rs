use std::sync::Arc;

use crate::services::access::AccessGate;
use crate::services::queue::TaskQueue;
use crate::services::storage::ArtifactStore;
use crate::store::JobStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JobStore>,
    pub gate: Arc<AccessGate>,
    pub queue: Arc<dyn TaskQueue>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(
        store: Arc<JobStore>,
        gate: AccessGate,
        queue: Arc<dyn TaskQueue>,
        artifacts: Arc<dyn ArtifactStore>,
        jwt_secret: &str,
    ) -> Self {
        Self {
            store,
            gate: Arc::new(gate),
            queue,
            artifacts,
            jwt_secret: Arc::from(jwt_secret),
        }
    }
}
