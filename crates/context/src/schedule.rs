//! Cron-driven maintenance. The scheduler only decides *when*; what each task
//! does lives behind [`MaintenanceTrigger`].

use std::{str::FromStr, sync::Arc};

use {
    chrono::{DateTime, Utc},
    cron::Schedule,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    config::CadenceConfig,
    engine::{MaintenanceTask, MaintenanceTrigger},
    error::{ContextError, Result},
};

struct Job {
    task: MaintenanceTask,
    schedule: Schedule,
}

pub struct Scheduler {
    trigger: Arc<dyn MaintenanceTrigger>,
    jobs: Vec<Job>,
}

fn parse_schedule(expr: &str) -> Result<Schedule> {
    Schedule::from_str(expr)
        .map_err(|e| ContextError::Config(format!("invalid cron expression {expr:?}: {e}")))
}

impl Scheduler {
    /// Daily snapshot refresh plus an index check that only rebuilds when the
    /// month rolled over.
    pub fn from_cadence(trigger: Arc<dyn MaintenanceTrigger>, cadence: &CadenceConfig) -> Result<Self> {
        Ok(Self {
            trigger,
            jobs: vec![
                Job {
                    task: MaintenanceTask::RefreshSnapshots,
                    schedule: parse_schedule(&cadence.refresh_schedule)?,
                },
                Job {
                    task: MaintenanceTask::CheckIndex,
                    schedule: parse_schedule(&cadence.index_schedule)?,
                },
            ],
        })
    }

    /// The earliest instant strictly after `after` at which any job fires,
    /// with every task due at that instant in job order.
    pub fn next_due(&self, after: DateTime<Utc>) -> Option<(DateTime<Utc>, Vec<MaintenanceTask>)> {
        let upcoming: Vec<(DateTime<Utc>, MaintenanceTask)> = self
            .jobs
            .iter()
            .filter_map(|job| job.schedule.after(&after).next().map(|at| (at, job.task)))
            .collect();
        let earliest = upcoming.iter().map(|(at, _)| *at).min()?;
        let tasks = upcoming
            .into_iter()
            .filter(|(at, _)| *at == earliest)
            .map(|(_, task)| task)
            .collect();
        Some((earliest, tasks))
    }

    /// Fire tasks on schedule until `cancel` is triggered. A failing task is
    /// logged and retried at its next scheduled time.
    pub async fn run(self, cancel: CancellationToken) {
        let mut cursor = Utc::now();
        info!(jobs = self.jobs.len(), "maintenance scheduler started");
        loop {
            let Some((at, tasks)) = self.next_due(cursor) else {
                warn!("no upcoming maintenance, scheduler stopping");
                break;
            };
            let wait = (at - Utc::now()).to_std().unwrap_or_default();
            debug!(next = %at, ?tasks, "waiting for next maintenance");
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {},
            }
            for task in tasks {
                if let Err(e) = self.trigger.trigger(task).await {
                    warn!(%task, error = %e, "maintenance task failed");
                }
            }
            cursor = at;
        }
        info!("maintenance scheduler stopped");
    }
}
