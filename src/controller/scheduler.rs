use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use super::Pipeline;
use crate::config::SchedulerConfig;

/// Counters of the periodic pipeline task
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

/// Re-runs forecast + optimization on a fixed interval
pub struct TaskScheduler {
    config: SchedulerConfig,
    pipeline: Arc<Pipeline>,
    status: Arc<RwLock<TaskStatus>>,
}

impl TaskScheduler {
    pub fn new(pipeline: Arc<Pipeline>, config: SchedulerConfig) -> Self {
        Self {
            config,
            pipeline,
            status: Arc::new(RwLock::new(TaskStatus::default())),
        }
    }

    pub fn status_handle(&self) -> Arc<RwLock<TaskStatus>> {
        self.status.clone()
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        info!(
            every_minutes = self.config.run_every_minutes,
            run_on_start = self.config.run_on_start,
            "pipeline task started"
        );
        tokio::spawn(async move { self.run_loop().await })
    }

    async fn run_loop(&self) {
        let period = Duration::from_secs(self.config.run_every_minutes.max(1) * 60);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // First tick fires immediately
        if !self.config.run_on_start {
            ticker.tick().await;
        }

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    pub async fn tick(&self) {
        let now = Utc::now();
        {
            let mut status = self.status.write().await;
            status.last_run = Some(now);
            status.run_count += 1;
        }

        match self.pipeline.run_cycle().await {
            Ok(summary) => {
                let mut status = self.status.write().await;
                status.last_success = Some(now);
                status.success_count += 1;
                status.last_error = None;
                info!(run_id = %summary.run_id, savings = summary.savings(), "scheduled pipeline run completed");
            }
            Err(e) => {
                let mut status = self.status.write().await;
                status.error_count += 1;
                status.last_error = Some(format!("{e:#}"));
                error!(error = %e, "scheduled pipeline run failed");
            }
        }
    }
}
