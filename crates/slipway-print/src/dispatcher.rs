// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job dispatcher.
//
// Owns the printer device and a single worker that drains an unbounded FIFO
// of submitted jobs, so at most one job touches the device at a time.  A
// registry keeps every job queryable by id until the reaper removes it some
// time after it finished.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use slipway_core::config::AppConfig;
use slipway_core::error::{Result, SlipwayError};
use slipway_core::types::{JobId, JobState};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::device::PrinterDevice;
use crate::job::{Job, DEFAULT_WRAP_WIDTH};

type Registry = Arc<Mutex<HashMap<JobId, Arc<Job>>>>;

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How long finished jobs stay queryable.
    pub retention: chrono::Duration,
    /// Interval between reaper sweeps.
    pub reap_interval: std::time::Duration,
    /// Column width for wrapped text jobs.
    pub wrap_width: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            retention: chrono::Duration::minutes(30),
            reap_interval: std::time::Duration::from_secs(60),
            wrap_width: DEFAULT_WRAP_WIDTH,
        }
    }
}

impl From<&AppConfig> for DispatcherConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            retention: chrono::Duration::seconds(
                i64::try_from(config.retention_secs).unwrap_or(i64::MAX),
            ),
            reap_interval: std::time::Duration::from_secs(config.reap_interval_secs.max(1)),
            wrap_width: config.wrap_width.max(1),
        }
    }
}

/// Serializes jobs onto one printer device.
pub struct JobDispatcher {
    registry: Registry,
    sender: Mutex<Option<mpsc::UnboundedSender<Arc<Job>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    reaper: Mutex<Option<JoinHandle<()>>>,
    shutdown_signal: Arc<Notify>,
    config: DispatcherConfig,
}

impl JobDispatcher {
    /// Take ownership of `device` and start the worker and reaper.
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(device))]
    pub fn start<D: PrinterDevice + 'static>(device: D, config: DispatcherConfig) -> Self {
        let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
        let (sender, receiver) = mpsc::unbounded_channel::<Arc<Job>>();
        let shutdown_signal = Arc::new(Notify::new());

        // The device API is blocking (serial writes), so the worker lives on
        // the blocking pool rather than on a runtime thread.
        let worker = tokio::task::spawn_blocking(move || run_worker(device, receiver));

        let reaper = {
            let registry = Arc::clone(&registry);
            let shutdown = Arc::clone(&shutdown_signal);
            let retention = config.retention;
            let mut ticker = tokio::time::interval(config.reap_interval);
            tokio::spawn(async move {
                // The first tick completes immediately.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = shutdown.notified() => {
                            debug!("reaper shutting down");
                            break;
                        }
                        _ = ticker.tick() => {
                            reap_registry(&registry, Utc::now(), retention);
                        }
                    }
                }
            })
        };

        info!("job dispatcher started");
        Self {
            registry,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            reaper: Mutex::new(Some(reaper)),
            shutdown_signal,
            config,
        }
    }

    /// Column width applied to wrapped text jobs.
    pub fn wrap_width(&self) -> usize {
        self.config.wrap_width
    }

    /// Register `job`, mark it queued and hand it to the worker.
    ///
    /// Never blocks on job execution.
    pub fn submit(&self, job: Job) -> Result<JobId> {
        let guard = self.sender.lock().expect("dispatcher sender lock poisoned");
        let sender = guard
            .as_ref()
            .ok_or_else(|| SlipwayError::Dispatcher("dispatcher is shut down".into()))?;

        job.queued();
        let job = Arc::new(job);
        let id = job.id();
        self.lock_registry().insert(id, Arc::clone(&job));

        if sender.send(Arc::clone(&job)).is_err() {
            self.lock_registry().remove(&id);
            return Err(SlipwayError::Dispatcher("worker has stopped".into()));
        }

        info!(job_id = %id, kind = ?job.kind(), "job submitted");
        Ok(id)
    }

    /// Current state of a registered job.
    pub fn state_of(&self, id: &JobId) -> Option<JobState> {
        self.job(id).map(|job| job.state())
    }

    /// Look up a registered job.
    pub fn job(&self, id: &JobId) -> Option<Arc<Job>> {
        self.lock_registry().get(id).cloned()
    }

    /// Number of registered jobs, finished ones included.
    pub fn len(&self) -> usize {
        self.lock_registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove jobs that finished more than the retention period ago.
    pub fn reap(&self) -> usize {
        self.reap_at(Utc::now())
    }

    /// [`JobDispatcher::reap`] against an explicit clock.
    pub fn reap_at(&self, now: DateTime<Utc>) -> usize {
        reap_registry(&self.registry, now, self.config.retention)
    }

    /// Stop accepting jobs, let the worker drain the queue, stop the reaper.
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .expect("dispatcher sender lock poisoned")
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);
        self.shutdown_signal.notify_one();

        let worker = self.worker.lock().expect("dispatcher worker lock poisoned").take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "dispatcher worker panicked");
            }
        }
        let reaper = self.reaper.lock().expect("dispatcher reaper lock poisoned").take();
        if let Some(reaper) = reaper {
            let _ = reaper.await;
        }
        info!("job dispatcher stopped");
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, Arc<Job>>> {
        self.registry.lock().expect("job registry lock poisoned")
    }
}

fn run_worker<D: PrinterDevice>(mut device: D, mut receiver: mpsc::UnboundedReceiver<Arc<Job>>) {
    while let Some(job) = receiver.blocking_recv() {
        let id = job.id();
        debug!(job_id = %id, "job picked up");
        job.run(&mut device);
        info!(job_id = %id, state = %job.state(), "job finished");
    }
    debug!("dispatcher worker drained");
}

fn reap_registry(registry: &Registry, now: DateTime<Utc>, retention: chrono::Duration) -> usize {
    let mut jobs = registry.lock().expect("job registry lock poisoned");
    let before = jobs.len();
    jobs.retain(|_, job| !job.is_reapable_at(now, retention));
    let reaped = before - jobs.len();
    if reaped > 0 {
        info!(reaped, remaining = jobs.len(), "expired jobs reaped");
    }
    reaped
}
