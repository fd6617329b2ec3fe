pub mod pipeline;
pub mod scheduler;

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::repo::Repositories;

pub use pipeline::*;
pub use scheduler::{TaskScheduler, TaskStatus};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    /// Present when the periodic task runs
    pub scheduler: Option<Arc<RwLock<TaskStatus>>>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let repos = Repositories::new(&cfg).await?;
        Ok(Self::with_repos(cfg, repos))
    }

    pub fn with_repos(cfg: Config, repos: Repositories) -> Self {
        let pipeline = Arc::new(Pipeline::new(&cfg, repos));
        Self {
            cfg: Arc::new(cfg),
            pipeline,
            scheduler: None,
        }
    }
}

/// Start the periodic pipeline task and record its status handle in the state
pub fn spawn_scheduler(state: &mut AppState) -> tokio::task::JoinHandle<()> {
    let scheduler = Arc::new(TaskScheduler::new(
        state.pipeline.clone(),
        state.cfg.scheduler.clone(),
    ));
    state.scheduler = Some(scheduler.status_handle());
    scheduler.start()
}
