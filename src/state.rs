// Shared application state
// Owns the configuration, the repository, and the probe cache. The cache is
// explicit state with an explicit update operation, not an ambient global:
// None means the sandbox has not been probed yet.

use tokio::sync::RwLock;

use crate::config::Config;
use crate::models::sandbox::ProbeResult;
use crate::repositories::ThreadRepository;
use crate::services::sandbox::probe_sandbox;

pub struct AppState {
    pub config: Config,
    pub repo: ThreadRepository,
    probe: RwLock<Option<ProbeResult>>,
}

impl AppState {
    pub fn new(config: Config, repo: ThreadRepository) -> Self {
        Self {
            config,
            repo,
            probe: RwLock::new(None),
        }
    }

    /// Last known sandbox health; None until the first probe completes
    pub async fn sandbox_health(&self) -> Option<ProbeResult> {
        self.probe.read().await.clone()
    }

    /// Run a probe and record its result as the latest health status
    pub async fn run_sandbox_probe(&self) -> ProbeResult {
        let result = probe_sandbox(&self.config).await;
        log::info!("sandbox probe: {:?} ({})", result.status, result.message);
        *self.probe.write().await = Some(result.clone());
        result
    }
}
