use std::sync::Arc;

use crate::{config::Config, engine::DerivationEngine, repo::Repository};

/// Shared handles for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub repo: Arc<dyn Repository>,
    pub engine: DerivationEngine,
}

impl AppState {
    pub fn new(cfg: Config, repo: Arc<dyn Repository>) -> anyhow::Result<Self> {
        let engine = DerivationEngine::from_config(repo.clone(), &cfg.engine)?;
        Ok(Self {
            cfg: Arc::new(cfg),
            repo,
            engine,
        })
    }
}
