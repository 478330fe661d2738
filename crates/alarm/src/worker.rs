//! Timer worker: the single consumer of the alarm registry.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::info;
use thiserror::Error;

use crate::registry::{AlarmRegistry, Due};
use crate::sink::{AlarmSink, Lifecycle};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to spawn timer thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("timer thread panicked")]
    Panicked,
}

/// Totals reported by a worker when its loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub fired: u64,
    pub discarded: u64,
}

/// Long-lived loop draining due alarms from the registry into a sink.
pub struct TimerWorker {
    registry: Arc<AlarmRegistry>,
    sink: Arc<dyn AlarmSink>,
}

impl TimerWorker {
    pub fn new(registry: Arc<AlarmRegistry>, sink: Arc<dyn AlarmSink>) -> Self {
        Self { registry, sink }
    }

    /// Runs on the calling thread until the registry is closed.
    pub fn run(&self) -> WorkerReport {
        let mut report = WorkerReport::default();
        while let Some(due) = self.registry.next_due() {
            match due {
                Due::Fire(entry) => {
                    report.fired += 1;
                    self.sink.fired(&entry);
                }
                Due::Discard(entry) => {
                    report.discarded += 1;
                    self.sink.lifecycle(&Lifecycle::Discarded(entry.notice()));
                }
            }
        }
        report
    }

    /// Moves the worker onto its own named thread.
    pub fn spawn(self) -> Result<WorkerHandle, WorkerError> {
        let registry = Arc::clone(&self.registry);
        let name = registry.config().worker_name;
        let thread = thread::Builder::new().name(name.to_string()).spawn(move || {
            info!("timer worker started");
            let report = self.run();
            info!(
                "timer worker stopped: {} fired, {} discarded",
                report.fired, report.discarded
            );
            report
        })?;
        Ok(WorkerHandle { registry, thread })
    }
}

/// Handle to a spawned [`TimerWorker`].
pub struct WorkerHandle {
    registry: Arc<AlarmRegistry>,
    thread: JoinHandle<WorkerReport>,
}

impl WorkerHandle {
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Closes the registry and waits for the timer thread to exit.
    pub fn shutdown(self) -> Result<WorkerReport, WorkerError> {
        self.registry.close();
        self.thread.join().map_err(|_| WorkerError::Panicked)
    }
}
