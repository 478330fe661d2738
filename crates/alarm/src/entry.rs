//! Alarm entries and the value types they are built from.

use core::fmt;
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::error::{AlarmError, AlarmResult};

/// Longest message an alarm may carry, in bytes.
pub const MAX_MESSAGE_LEN: usize = 127;

/// Caller-supplied alarm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(transparent))]
pub struct AlarmId(pub u32);

impl AlarmId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message text bounded to [`MAX_MESSAGE_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(transparent))]
pub struct AlarmMessage(String);

impl AlarmMessage {
    /// Wraps `text`, rejecting anything longer than [`MAX_MESSAGE_LEN`] bytes.
    pub fn new(text: impl Into<String>) -> AlarmResult<Self> {
        let text = text.into();
        if text.len() > MAX_MESSAGE_LEN {
            return Err(AlarmError::MessageTooLong(text.len()));
        }
        Ok(Self(text))
    }

    /// Wraps `text`, cutting it back to the last character boundary that fits.
    pub fn truncated(text: &str) -> Self {
        if text.len() <= MAX_MESSAGE_LEN {
            return Self(text.to_owned());
        }
        let mut end = MAX_MESSAGE_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        Self(text[..end].to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlarmMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AlarmMessage {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One pending alarm.
///
/// Entries live inside the registry until the timer worker dequeues them;
/// from then on the worker owns them exclusively.
#[derive(Debug, Clone)]
pub struct AlarmEntry {
    id: AlarmId,
    delay_seconds: u32,
    due_at: Instant,
    message: AlarmMessage,
    cancelled: bool,
    replaced: bool,
}

impl AlarmEntry {
    pub(crate) fn new(id: AlarmId, delay_seconds: u32, due_at: Instant, message: AlarmMessage) -> Self {
        Self {
            id,
            delay_seconds,
            due_at,
            message,
            cancelled: false,
            replaced: false,
        }
    }

    pub fn id(&self) -> AlarmId {
        self.id
    }

    /// Relative delay requested by the most recent submission or replacement.
    pub fn delay_seconds(&self) -> u32 {
        self.delay_seconds
    }

    pub fn due_at(&self) -> Instant {
        self.due_at
    }

    pub fn message(&self) -> &AlarmMessage {
        &self.message
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// True once a replacement has been applied since creation.
    pub fn is_replaced(&self) -> bool {
        self.replaced
    }

    /// Time left until the entry is due, zero if already due.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.due_at.saturating_duration_since(now)
    }

    /// Marks the entry cancelled. Returns `false` if it already was.
    pub(crate) fn cancel(&mut self) -> bool {
        !core::mem::replace(&mut self.cancelled, true)
    }

    pub(crate) fn apply_replacement(&mut self, delay_seconds: u32, due_at: Instant, message: AlarmMessage) {
        self.delay_seconds = delay_seconds;
        self.due_at = due_at;
        self.message = message;
        self.replaced = true;
    }

    pub fn notice(&self) -> AlarmNotice {
        AlarmNotice {
            id: self.id,
            delay_seconds: self.delay_seconds,
            message: self.message.clone(),
        }
    }
}

/// The `{id, delay_seconds, message}` triple reported to sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct AlarmNotice {
    pub id: AlarmId,
    pub delay_seconds: u32,
    pub message: AlarmMessage,
}

/// Point-in-time view of an entry still held by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PendingAlarm {
    pub id: AlarmId,
    pub delay_seconds: u32,
    pub remaining: Duration,
    pub message: AlarmMessage,
    pub cancelled: bool,
    pub replaced: bool,
}

impl PendingAlarm {
    pub(crate) fn from_entry(entry: &AlarmEntry, now: Instant) -> Self {
        Self {
            id: entry.id,
            delay_seconds: entry.delay_seconds,
            remaining: entry.remaining(now),
            message: entry.message.clone(),
            cancelled: entry.cancelled,
            replaced: entry.replaced,
        }
    }
}
