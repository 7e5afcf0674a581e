//! Scheduled background jobs
//!
//! A [`JobSet`] belongs to one service. Each job holds only a weak reference to
//! that service and stops on its own once the service is dropped; the set
//! aborts whatever is still running on [`JobSet::abort_all`] or on drop.

use log::{debug, warn};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Default)]
pub struct JobSet {
    jobs: Vec<(String, JoinHandle<()>)>,
}

impl JobSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` every `period` for as long as `target` is alive
    ///
    /// The first run happens one full period after scheduling. Returns `false`
    /// without scheduling anything when called outside a tokio runtime or with
    /// a zero period.
    pub fn every<T, F, Fut>(&mut self, name: &str, period: Duration, target: Weak<T>, job: F) -> bool
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            warn!("Not scheduling job {}: period must be greater than zero", name);
            return false;
        }
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("Not scheduling job {}: no tokio runtime available", name);
                return false;
            }
        };

        let job_name = name.to_string();
        let task = handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                let Some(target) = target.upgrade() else {
                    debug!("Job {} stopping, owner dropped", job_name);
                    break;
                };
                job(target).await;
            }
        });

        debug!("Scheduled job {} every {:?}", name, period);
        self.jobs.push((name.to_string(), task));
        true
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.jobs.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Abort every scheduled job, returning how many were aborted
    pub fn abort_all(&mut self) -> usize {
        let count = self.jobs.len();
        for (name, task) in self.jobs.drain(..) {
            task.abort();
            debug!("Aborted job {}", name);
        }
        count
    }
}

impl Drop for JobSet {
    fn drop(&mut self) {
        self.abort_all();
    }
}
