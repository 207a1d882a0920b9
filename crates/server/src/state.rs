use std::sync::Arc;

use turnstile_core::{Config, SanitizedConfig, SurfaceFactory};

use crate::api::WsBroadcaster;
use crate::jobs::{JobRegistry, JobSettings};

/// Shared application state
pub struct AppState {
    config: Config,
    jobs: JobRegistry,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(
        config: Config,
        factory: Arc<dyn SurfaceFactory>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        let settings = JobSettings {
            orchestrator: config.service_orchestrator(),
            profile: config.storefront.clone(),
            max_concurrent: config.server.max_concurrent_jobs,
            event_history: config.server.job_event_history,
            max_finished: config.server.max_finished_jobs,
            keep_open_on_success: config.webdriver.keep_open_on_success,
        };
        let jobs = JobRegistry::new(factory, settings, ws_broadcaster.clone());
        Self {
            config,
            jobs,
            ws_broadcaster,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
