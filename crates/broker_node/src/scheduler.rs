use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

/// Background jobs, each on its own interval.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `job` every `period`, starting immediately. A run that fails is logged and
    /// the next tick runs it again. Ticks missed while a run is in progress are skipped.
    pub fn spawn<F, Fut, T, E>(&mut self, name: &'static str, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Debug + Send + 'static,
        E: Display + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match job().await {
                    Ok(res) => debug!(job = name, "Job finished: {res:?}"),
                    Err(err) => error!(job = name, "Job failed: {err}"),
                }
            }
        });
        info!("Scheduled {name} every {period:?}");
        self.jobs.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Stops every job. A run in progress is cancelled at its next await point.
    pub async fn shutdown(&mut self) {
        for (name, handle) in self.jobs.drain(..) {
            handle.abort();
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    error!("Job {name} panicked: {err}");
                }
            }
        }
    }
}
