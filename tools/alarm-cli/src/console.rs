//! Console Formatter
//!
//! Renders fired alarms and lifecycle notices as text or JSON lines.

use std::io::{self, Write};

use alarm::{AlarmEntry, AlarmId, AlarmNotice, AlarmSink, CancelRejection, Lifecycle, PendingAlarm};
use chrono::Utc;
use colored::Colorize;
use log::warn;
use parking_lot::Mutex;
use serde::Serialize;

/// One machine-readable output line.
#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'static str,
    at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    alarm: Option<&'a AlarmNotice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<AlarmId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending: Option<&'a [PendingAlarm]>,
}

impl<'a> JsonEvent<'a> {
    fn new(event: &'static str, at: i64) -> Self {
        Self {
            event,
            at,
            alarm: None,
            id: None,
            reason: None,
            pending: None,
        }
    }

    fn with_alarm(mut self, alarm: &'a AlarmNotice) -> Self {
        self.alarm = Some(alarm);
        self
    }
}

/// Formats console lines. `at` is a Unix timestamp in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer {
    json: bool,
}

impl Renderer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn fired(&self, alarm: &AlarmNotice, at: i64) -> String {
        if self.json {
            return to_json(&JsonEvent::new("fired", at).with_alarm(alarm));
        }
        format!(
            "{} With Message Number ({}) Fired at <{}>: <{} {}>",
            "Alarm".green().bold(),
            alarm.id,
            at,
            alarm.delay_seconds,
            alarm.message
        )
    }

    pub fn lifecycle(&self, event: &Lifecycle, at: i64) -> String {
        if self.json {
            return self.lifecycle_json(event, at);
        }
        match event {
            Lifecycle::Submitted(alarm) => format!(
                "{} With Message Number ({}) Received at <{}>: <{} {}>",
                "First Alarm Request".bold(),
                alarm.id,
                at,
                alarm.delay_seconds,
                alarm.message
            ),
            Lifecycle::Replaced(alarm) => format!(
                "{} With Message Number ({}) Received at <{}>: <{} {}>",
                "Replacement Alarm Request".yellow(),
                alarm.id,
                at,
                alarm.delay_seconds,
                alarm.message
            ),
            Lifecycle::CancelAccepted(alarm) => format!(
                "{} With Message Number ({}) Received at <{}>: <{} {}>",
                "Cancel Alarm Request".cyan(),
                alarm.id,
                at,
                alarm.delay_seconds,
                alarm.message
            ),
            Lifecycle::CancelRejected {
                id,
                reason: CancelRejection::NotFound,
            } => format!(
                "{} No Alarm Request With Message Number ({id}) to Cancel!",
                "Error:".red()
            ),
            Lifecycle::CancelRejected {
                id,
                reason: CancelRejection::AlreadyCancelled,
            } => format!(
                "{} More Than One Request to Cancel Alarm Request With Message Number ({id})!",
                "Error:".red()
            ),
            Lifecycle::Discarded(alarm) => format!(
                "{} With Message Number ({}) Discarded at <{}>: <{} {}>",
                "Cancelled Alarm Request".dimmed(),
                alarm.id,
                at,
                alarm.delay_seconds,
                alarm.message
            ),
        }
    }

    pub fn listing(&self, pending: &[PendingAlarm], at: i64) -> String {
        if self.json {
            let mut record = JsonEvent::new("list", at);
            record.pending = Some(pending);
            return to_json(&record);
        }
        if pending.is_empty() {
            return "No pending alarms".to_string();
        }

        let mut out = format!("Pending alarms at <{at}>:");
        for alarm in pending {
            let mut flags = String::new();
            if alarm.cancelled {
                flags.push_str(" [cancelled]");
            }
            if alarm.replaced {
                flags.push_str(" [replaced]");
            }
            out.push_str(&format!(
                "\n  ({}) due in {}s: <{} {}>{}",
                alarm.id,
                alarm.remaining.as_secs(),
                alarm.delay_seconds,
                alarm.message,
                flags
            ));
        }
        out
    }

    fn lifecycle_json(&self, event: &Lifecycle, at: i64) -> String {
        let record = match event {
            Lifecycle::Submitted(alarm) => JsonEvent::new("submitted", at).with_alarm(alarm),
            Lifecycle::Replaced(alarm) => JsonEvent::new("replaced", at).with_alarm(alarm),
            Lifecycle::CancelAccepted(alarm) => {
                JsonEvent::new("cancel_accepted", at).with_alarm(alarm)
            }
            Lifecycle::Discarded(alarm) => JsonEvent::new("discarded", at).with_alarm(alarm),
            Lifecycle::CancelRejected { id, reason } => {
                let mut record = JsonEvent::new("cancel_rejected", at);
                record.id = Some(*id);
                record.reason = Some(match reason {
                    CancelRejection::NotFound => "not_found",
                    CancelRejection::AlreadyCancelled => "already_cancelled",
                });
                record
            }
        };
        to_json(&record)
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|err| {
        warn!("failed to encode console record: {err}");
        String::new()
    })
}

/// Sink that prints to a shared writer, normally stdout.
pub struct ConsoleSink<W: Write + Send> {
    out: Mutex<W>,
    renderer: Renderer,
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W, renderer: Renderer) -> Self {
        Self {
            out: Mutex::new(out),
            renderer,
        }
    }

    /// Writes the prompt without a trailing newline.
    pub fn prompt(&self, text: &str) -> io::Result<()> {
        let mut out = self.out.lock();
        out.write_all(text.as_bytes())?;
        out.flush()
    }

    pub fn listing(&self, pending: &[PendingAlarm]) {
        self.write_line(&self.renderer.listing(pending, now()));
    }

    /// Consumes the sink and hands back the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock();
        if let Err(err) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            warn!("console write failed: {err}");
        }
    }
}

impl<W: Write + Send> AlarmSink for ConsoleSink<W> {
    fn fired(&self, alarm: &AlarmEntry) {
        self.write_line(&self.renderer.fired(&alarm.notice(), now()));
    }

    fn lifecycle(&self, event: &Lifecycle) {
        self.write_line(&self.renderer.lifecycle(event, now()));
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}
