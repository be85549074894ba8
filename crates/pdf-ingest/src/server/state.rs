//! Shared application state for the HTTP layer

use std::sync::Arc;

use crate::config::IngestConfig;
use crate::service::IngestService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: IngestConfig,
    service: IngestService,
}

impl AppState {
    pub fn new(config: IngestConfig, service: IngestService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, service }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &IngestConfig {
        &self.inner.config
    }

    /// Queue operations
    pub fn service(&self) -> &IngestService {
        &self.inner.service
    }
}
