pub mod booking_reaper;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::config::{ReaperConfig, WorkerConfig};
use crate::store::Store;

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    BookingReaper,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BookingReaper => "booking_reaper",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: String,
    pub enabled: bool,
}

pub struct WorkerManager {
    store: Arc<Store>,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
    reaper: ReaperConfig,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
        reaper: &ReaperConfig,
    ) -> Self {
        Self {
            store,
            shutdown_rx,
            config: config.clone(),
            reaper: reaper.clone(),
        }
    }

    /// Single source of truth for all planned jobs and their cron schedules.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.is_leader {
            return Vec::new();
        }

        vec![JobSpec {
            name: WorkerName::BookingReaper,
            cron: self.reaper.cron.clone(),
            enabled: true,
        }]
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Start the worker scheduler. Returns an error if the scheduler cannot be created or started.
    pub async fn start(mut self) -> Result<(), JobSchedulerError> {
        if !self.config.is_leader {
            tracing::info!("Worker leader disabled; skipping worker startup");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;

        self.register_jobs(&scheduler).await;

        scheduler.start().await?;

        tracing::info!("Worker manager started");

        if self.reaper.run_on_start {
            let store = self.store.clone();
            let reaper = self.reaper.clone();
            invoke(
                WorkerName::BookingReaper.as_str(),
                self.timeout(),
                booking_reaper::run(store, reaper),
            )
            .await;
        }

        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            "Worker manager shutting down, draining for {}s",
            DRAIN_TIMEOUT.as_secs()
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        scheduler.shutdown().await?;
        Ok(())
    }

    /// Register all jobs with the scheduler, using `planned_jobs()` as the single source of truth.
    async fn register_jobs(&self, scheduler: &JobScheduler) {
        for spec in self.planned_jobs() {
            if !spec.enabled {
                tracing::info!(name = spec.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let store = self.store.clone();
            let name_str = spec.name.as_str();

            match spec.name {
                WorkerName::BookingReaper => {
                    let reaper = self.reaper.clone();
                    add_job(scheduler, &spec.cron, name_str, self.timeout(), move || {
                        booking_reaper::run(store.clone(), reaper.clone())
                    })
                    .await;
                }
            }
            tracing::info!(name = name_str, cron = %spec.cron, "Registered worker");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Invocation {
    Completed,
    Failed,
    TimedOut,
}

/// Runs one invocation under the scheduler timeout. A returned error or a
/// timeout is reported as a failed invocation; the next tick runs as usual.
async fn invoke<Fut, E>(name: &'static str, timeout: Duration, fut: Fut) -> Invocation
where
    Fut: Future<Output = Result<(), E>>,
    E: fmt::Display,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(())) => Invocation::Completed,
        Ok(Err(err)) => {
            tracing::error!(worker = name, error = %err, "Worker invocation failed");
            Invocation::Failed
        }
        Err(_) => {
            tracing::error!(
                worker = name,
                timeout_secs = timeout.as_secs(),
                "Worker timed out"
            );
            Invocation::TimedOut
        }
    }
}

/// Add a job to the scheduler with a timeout wrapper.
async fn add_job<Fut, F, E>(
    scheduler: &JobScheduler,
    cron: &str,
    name: &'static str,
    timeout: Duration,
    mut run: F,
) where
    F: FnMut() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let fut = run();
        Box::pin(async move {
            invoke(name, timeout, fut).await;
        })
    });

    match job {
        Ok(job) => {
            if let Err(err) = scheduler.add(job).await {
                tracing::error!(error=%err, cron, worker = name, "Failed to add worker job");
            }
        }
        Err(err) => tracing::error!(error=%err, cron, worker = name, "Failed to create worker job"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use tokio::sync::broadcast;

    use crate::config::{ReaperConfig, WorkerConfig};
    use crate::store::operations::bookings::{BookingRef, BookingStore, DeleteBatch};
    use crate::store::{Store, StoreError};

    use super::*;

    fn open_store(tmp: &tempfile::TempDir, name: &str) -> Arc<Store> {
        Arc::new(Store::open(tmp.path().join(name).to_str().unwrap()).unwrap())
    }

    #[tokio::test]
    async fn leader_switch_controls_job_registration() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = open_store(&tmp, "worker_test.sled");
        let (tx, _) = broadcast::channel(2);

        let worker_cfg = WorkerConfig {
            is_leader: false,
            ..WorkerConfig::default()
        };

        let manager =
            WorkerManager::new(store, tx.subscribe(), &worker_cfg, &ReaperConfig::default());
        assert!(manager.planned_jobs().is_empty());
    }

    #[tokio::test]
    async fn leader_plans_reaper_with_configured_cron() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = open_store(&tmp, "worker_test_2.sled");
        let (tx, _) = broadcast::channel(2);

        let reaper = ReaperConfig {
            cron: "0 30 1 * * *".to_string(),
            ..ReaperConfig::default()
        };
        let manager = WorkerManager::new(store, tx.subscribe(), &WorkerConfig::default(), &reaper);

        assert_eq!(
            manager.planned_jobs(),
            vec![JobSpec {
                name: WorkerName::BookingReaper,
                cron: "0 30 1 * * *".to_string(),
                enabled: true,
            }]
        );
    }

    #[tokio::test]
    async fn non_leader_start_returns_immediately() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = open_store(&tmp, "worker_test_3.sled");
        let (tx, _) = broadcast::channel(2);

        let worker_cfg = WorkerConfig {
            is_leader: false,
            ..WorkerConfig::default()
        };

        let manager =
            WorkerManager::new(store, tx.subscribe(), &worker_cfg, &ReaperConfig::default());
        manager
            .start()
            .await
            .expect("non-leader start should succeed");
    }

    /// Blocks every query for `delay`, like a store that stopped answering.
    struct StalledStore {
        delay: Duration,
    }

    impl BookingStore for StalledStore {
        fn query_bookings_before(
            &self,
            _: DateTime<Utc>,
        ) -> Result<Vec<BookingRef>, StoreError> {
            std::thread::sleep(self.delay);
            Ok(Vec::new())
        }

        fn commit_deletes(&self, _: DeleteBatch) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn invoke_reports_failures_and_timeouts() {
        let failed = invoke("failing", Duration::from_secs(1), async {
            Err::<(), _>("boom")
        })
        .await;
        assert_eq!(failed, Invocation::Failed);

        let slow = invoke("slow", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), String>(())
        })
        .await;
        assert_eq!(slow, Invocation::TimedOut);
    }

    #[tokio::test]
    async fn timeout_fires_while_store_is_blocked() {
        let store = Arc::new(StalledStore {
            delay: Duration::from_secs(2),
        });
        let started = std::time::Instant::now();

        let outcome = invoke(
            "booking_reaper",
            Duration::from_millis(50),
            booking_reaper::run(store, ReaperConfig::default()),
        )
        .await;

        assert_eq!(outcome, Invocation::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn reaper_run_completes_against_store() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = open_store(&tmp, "worker_test_4.sled");

        let outcome = invoke(
            "booking_reaper",
            Duration::from_secs(30),
            booking_reaper::run(store, ReaperConfig::default()),
        )
        .await;

        assert_eq!(outcome, Invocation::Completed);
    }

    #[test]
    fn worker_names_have_str() {
        assert_eq!(WorkerName::BookingReaper.as_str(), "booking_reaper");
    }
}
