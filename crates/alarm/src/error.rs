//! Error taxonomy for registry operations.
//!
//! Every variant is an expected, caller-handled condition. Nothing here is
//! process-fatal.

use thiserror::Error;

use crate::entry::{AlarmId, MAX_MESSAGE_LEN};

/// Errors returned by [`AlarmRegistry`](crate::AlarmRegistry) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlarmError {
    /// A live (pending, not cancelled) alarm already uses this id.
    #[error("alarm {0} is already pending")]
    DuplicateId(AlarmId),
    /// No live alarm carries this id.
    #[error("no pending alarm with id {0}")]
    NotFound(AlarmId),
    /// The alarm was cancelled before; cancellation happens at most once.
    #[error("alarm {0} is already cancelled")]
    AlreadyCancelled(AlarmId),
    /// Delays are whole units and must be at least one.
    #[error("delay must be a positive number of seconds")]
    InvalidDelay,
    /// Message text longer than `MAX_MESSAGE_LEN` bytes.
    #[error("message is {0} bytes, limit is {MAX_MESSAGE_LEN}")]
    MessageTooLong(usize),
    /// The registry has been shut down.
    #[error("alarm registry is closed")]
    Closed,
}

pub type AlarmResult<T> = Result<T, AlarmError>;
