//! Job poller
//!
//! Polls the grading queue and runs jobs through the driver.
//! Every tick starts one worker per free slot; a worker keeps taking jobs
//! until the queue reports empty, then gives its slot back. Once shutdown has
//! begun a worker finishes its current job and takes no new one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{Instrument, debug, error, info, info_span};

use crate::config::Config;
use crate::scheduler::driver::JobDriver;

/// Job poller that continuously polls for and grades jobs
pub struct JobPoller {
    config: Config,
    driver: Arc<JobDriver>,
    semaphore: Arc<Semaphore>,
    shutdown: Arc<AtomicBool>,
}

impl JobPoller {
    /// Creates a new job poller
    pub fn new(config: Config, driver: Arc<JobDriver>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_jobs));
        Self {
            config,
            driver,
            semaphore,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) {
        info!(
            "Starting job poller (interval: {:?}, max parallel jobs: {})",
            self.config.poll_interval, self.config.max_parallel_jobs
        );

        let mut interval = time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let started = self.poll_once().len();
            if started > 0 {
                debug!("Started {} worker(s) this cycle", started);
            }
        }
    }

    /// Starts a worker for every free slot
    fn poll_once(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        if self.shutdown.load(Ordering::SeqCst) {
            return handles;
        }

        // Permit is released when the worker finishes
        while let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            handles.push(self.spawn_worker(permit));
        }

        handles
    }

    fn spawn_worker(&self, permit: OwnedSemaphorePermit) -> JoinHandle<()> {
        let driver = Arc::clone(&self.driver);
        let shutdown = Arc::clone(&self.shutdown);
        let span = info_span!("worker", runner = %self.config.runner_id);

        tokio::spawn(
            async move {
                let mut graded = 0usize;
                while !shutdown.load(Ordering::SeqCst) {
                    match driver.run_next().await {
                        Ok(Some(output)) => {
                            graded += 1;
                            debug!(
                                "Published output with {} response(s) and {} error(s)",
                                output.responses.len(),
                                output.errors.len()
                            );
                        }
                        Ok(None) => break,
                        Err(e) => {
                            error!("Failed to start job: {:#}", e);
                            break;
                        }
                    }
                }

                if graded > 0 {
                    info!("Graded {} job(s)", graded);
                }
                drop(permit);
            }
            .instrument(span),
        )
    }

    /// Stops workers from taking new jobs and waits for the running ones
    pub async fn drain(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let slots = u32::try_from(self.config.max_parallel_jobs).unwrap_or(u32::MAX);
        info!("Waiting for running jobs to finish");
        match self.semaphore.acquire_many(slots).await {
            Ok(permits) => {
                // Keep the slots so no new worker starts during shutdown
                permits.forget();
                info!("All jobs finished");
            }
            Err(e) => error!("Failed to wait for running jobs: {}", e),
        }
    }
}
