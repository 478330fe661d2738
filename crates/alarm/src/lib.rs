//! # alarm
//!
//! A single-process, in-memory alarm scheduler. Producers submit
//! "fire at T, emit message M, identified by id N" requests; a dedicated
//! timer thread sleeps exactly until the earliest alarm is due, hands it to
//! a sink, and goes back to waiting.
//!
//! ## Module Overview
//! - [`entry`]    – Alarm identifiers, bounded messages and pending entries.
//! - [`error`]    – Recoverable error taxonomy shared by every operation.
//! - [`registry`] – The shared, time-ordered registry and its wake-up protocol.
//! - [`worker`]   – The timer thread that drains due alarms into a sink.
//! - [`intake`]   – Translation of structured requests into registry calls.
//! - [`sink`]     – Output interface for fired alarms and lifecycle notices.
//!
//! Data flows `RequestIntake → AlarmRegistry → TimerWorker → AlarmSink`; the
//! registry is the only shared state and owns all synchronization.

pub mod entry;
pub mod error;
pub mod intake;
pub mod registry;
pub mod sink;
pub mod worker;

pub use entry::{AlarmEntry, AlarmId, AlarmMessage, AlarmNotice, PendingAlarm, MAX_MESSAGE_LEN};
pub use error::{AlarmError, AlarmResult};
pub use intake::{Outcome, Request, RequestIntake};
pub use registry::{AlarmRegistry, Due, RegistryConfig, RegistryConfigBuilder, RegistryStats};
pub use sink::{AlarmSink, CancelRejection, Lifecycle};
pub use worker::{TimerWorker, WorkerError, WorkerHandle, WorkerReport};

#[cfg(test)]
mod tests;
