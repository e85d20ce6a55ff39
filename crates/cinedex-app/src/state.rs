use std::{sync::Arc, time::Duration};

use cinedex_dal::Pool;

#[derive(Clone)]
pub struct AppState {
    state: Arc<AppStateInner>,
}

impl AppState {
    pub fn new(app_config: AppConfig, pool: Pool) -> Self {
        AppState {
            state: Arc::new(AppStateInner { app_config, pool }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.state.app_config
    }

    pub fn pool(&self) -> &Pool {
        &self.state.pool
    }
}

struct AppStateInner {
    pool: Pool,
    app_config: AppConfig,
}

// Validation context for extractors that need none
impl axum::extract::FromRef<AppState> for () {
    fn from_ref(_: &AppState) -> Self {}
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Deployment environment reported by the health check
    pub environment: String,
    pub version: String,
    /// Deadline for each database round trip
    pub query_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            query_timeout: cinedex_dal::DEFAULT_QUERY_TIMEOUT,
        }
    }
}
