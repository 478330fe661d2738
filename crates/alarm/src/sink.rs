//! Output side of the scheduler.
//!
//! A sink receives every fired alarm from the timer worker and, optionally,
//! the lifecycle notices produced while requests are handled.

use crate::entry::{AlarmEntry, AlarmId, AlarmNotice};

/// Why a cancel request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelRejection {
    NotFound,
    AlreadyCancelled,
}

/// Lifecycle notifications an outer layer may display or log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Submitted(AlarmNotice),
    Replaced(AlarmNotice),
    CancelAccepted(AlarmNotice),
    CancelRejected { id: AlarmId, reason: CancelRejection },
    /// A cancelled alarm reached its due time and was dropped unfired.
    Discarded(AlarmNotice),
}

/// Receiver for fired alarms.
pub trait AlarmSink: Send + Sync {
    fn fired(&self, alarm: &AlarmEntry);

    fn lifecycle(&self, _event: &Lifecycle) {}
}

impl<F> AlarmSink for F
where
    F: Fn(&AlarmEntry) + Send + Sync,
{
    fn fired(&self, alarm: &AlarmEntry) {
        self(alarm)
    }
}
