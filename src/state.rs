use std::sync::Arc;

use crate::config::Config;
use crate::git::Cloner;
use crate::github::{GitHubClient, SearchApi};
use crate::scan::{Scanner, TaskRegistry};
use crate::store::{JobStore, JsonStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn JobStore>,
    pub api: Arc<dyn SearchApi>,
    pub scanner: Arc<Scanner>,
    pub registry: TaskRegistry,
    pub cloner: Cloner,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        // Ensure data directories exist
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(config.repos_dir())?;

        let store = JsonStore::open(&config.jobs_path(), &config.candidates_path())?;
        let api = GitHubClient::new(config.github.clone())?;

        Ok(Self::with_parts(
            config,
            Arc::new(api),
            Arc::new(store),
            TaskRegistry::global().clone(),
        ))
    }

    /// Assemble state around an existing API client and store.
    pub fn with_parts(
        config: Config,
        api: Arc<dyn SearchApi>,
        store: Arc<dyn JobStore>,
        registry: TaskRegistry,
    ) -> Self {
        let cloner = Cloner::new(config.repos_dir(), config.clone_timeout());
        let scanner = Arc::new(Scanner::new(
            Arc::clone(&api),
            Arc::clone(&store),
            config.pacing.clone(),
            cloner.clone(),
        ));
        Self {
            config,
            store,
            api,
            scanner,
            registry,
            cloner,
        }
    }

    pub fn has_token(&self) -> bool {
        self.config.github.token.is_some()
    }
}
