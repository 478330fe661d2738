//! Request intake: turns structured requests into registry calls.
//!
//! Parsing raw input is the caller's job; by the time a [`Request`] exists
//! its fields are well formed.

use std::sync::Arc;

use log::warn;

use crate::entry::{AlarmId, AlarmMessage, AlarmNotice, PendingAlarm};
use crate::error::{AlarmError, AlarmResult};
use crate::registry::AlarmRegistry;
use crate::sink::{AlarmSink, CancelRejection, Lifecycle};

/// A request handed over by the command layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Insert, or replace if `id` is already pending.
    Submit {
        id: AlarmId,
        delay_seconds: u32,
        message: AlarmMessage,
    },
    Cancel { id: AlarmId },
    List,
}

/// What a request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Submitted(AlarmNotice),
    Replaced(AlarmNotice),
    CancelAccepted(AlarmNotice),
    CancelRejected { id: AlarmId, reason: CancelRejection },
    Listing(Vec<PendingAlarm>),
}

pub struct RequestIntake {
    registry: Arc<AlarmRegistry>,
    sink: Arc<dyn AlarmSink>,
}

impl RequestIntake {
    pub fn new(registry: Arc<AlarmRegistry>, sink: Arc<dyn AlarmSink>) -> Self {
        Self { registry, sink }
    }

    /// Applies `request` to the registry and reports the result to the sink.
    ///
    /// Cancel rejections are outcomes, not errors. An `Err` means the
    /// registry refused the request outright (closed, or a delay it cannot
    /// represent).
    pub fn handle(&self, request: Request) -> AlarmResult<Outcome> {
        let outcome = match request {
            Request::Submit {
                id,
                delay_seconds,
                message,
            } => self.submit(id, delay_seconds, message)?,
            Request::Cancel { id } => self.cancel(id)?,
            Request::List => return Ok(Outcome::Listing(self.registry.snapshot())),
        };

        if let Some(event) = outcome.lifecycle() {
            self.sink.lifecycle(&event);
        }
        Ok(outcome)
    }

    fn submit(&self, id: AlarmId, delay_seconds: u32, message: AlarmMessage) -> AlarmResult<Outcome> {
        let notice = AlarmNotice {
            id,
            delay_seconds,
            message,
        };
        loop {
            match self.registry.insert(id, delay_seconds, notice.message.clone()) {
                Ok(()) => return Ok(Outcome::Submitted(notice)),
                Err(AlarmError::DuplicateId(_)) => {}
                Err(err) => return Err(err),
            }
            match self.registry.replace(id, delay_seconds, notice.message.clone()) {
                Ok(()) => return Ok(Outcome::Replaced(notice)),
                // Fired or cancelled between the two calls; insert again.
                Err(AlarmError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }
    }

    fn cancel(&self, id: AlarmId) -> AlarmResult<Outcome> {
        let reason = match self.registry.cancel(id) {
            Ok(notice) => return Ok(Outcome::CancelAccepted(notice)),
            Err(AlarmError::NotFound(_)) => CancelRejection::NotFound,
            Err(AlarmError::AlreadyCancelled(_)) => CancelRejection::AlreadyCancelled,
            Err(err) => return Err(err),
        };
        warn!("cancel of alarm {id} rejected: {reason:?}");
        Ok(Outcome::CancelRejected { id, reason })
    }
}

impl Outcome {
    fn lifecycle(&self) -> Option<Lifecycle> {
        match self {
            Self::Submitted(notice) => Some(Lifecycle::Submitted(notice.clone())),
            Self::Replaced(notice) => Some(Lifecycle::Replaced(notice.clone())),
            Self::CancelAccepted(notice) => Some(Lifecycle::CancelAccepted(notice.clone())),
            Self::CancelRejected { id, reason } => Some(Lifecycle::CancelRejected {
                id: *id,
                reason: *reason,
            }),
            Self::Listing(_) => None,
        }
    }
}
