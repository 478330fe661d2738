use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

use crate::entry::{AlarmEntry, AlarmMessage, AlarmNotice};
use crate::registry::{AlarmRegistry, RegistryConfig};
use crate::sink::{AlarmSink, Lifecycle};

mod worker;

/// One delay unit in tests.
pub(crate) const UNIT: Duration = Duration::from_millis(20);
/// Upper bound for anything a test waits on.
pub(crate) const PATIENCE: Duration = Duration::from_secs(5);

static LOGGER: Lazy<()> = Lazy::new(|| {
    let _ = env_logger::builder().is_test(true).try_init();
});

pub(crate) fn fast_registry() -> Arc<AlarmRegistry> {
    Lazy::force(&LOGGER);
    Arc::new(AlarmRegistry::new(
        RegistryConfig::builder()
            .time_unit(UNIT)
            .worker_name("alarm-timer-test")
            .build(),
    ))
}

pub(crate) fn msg(text: &str) -> AlarmMessage {
    AlarmMessage::truncated(text)
}

#[derive(Default)]
struct Recorded {
    fired: Vec<(AlarmNotice, Instant)>,
    events: Vec<Lifecycle>,
}

/// Sink that records everything and lets tests block until fires arrive.
#[derive(Default)]
pub(crate) struct RecordingSink {
    recorded: Mutex<Recorded>,
    changed: Condvar,
}

impl RecordingSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Waits until at least `count` alarms fired, or [`PATIENCE`] elapses.
    pub(crate) fn wait_for_fires(&self, count: usize) -> Vec<AlarmNotice> {
        let guard = self.recorded.lock().unwrap();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, PATIENCE, |recorded| recorded.fired.len() < count)
            .unwrap();
        guard.fired.iter().map(|(notice, _)| notice.clone()).collect()
    }

    pub(crate) fn fire_times(&self) -> Vec<Instant> {
        let recorded = self.recorded.lock().unwrap();
        recorded.fired.iter().map(|(_, at)| *at).collect()
    }

    pub(crate) fn fired_notices(&self) -> Vec<AlarmNotice> {
        let recorded = self.recorded.lock().unwrap();
        recorded.fired.iter().map(|(notice, _)| notice.clone()).collect()
    }

    pub(crate) fn events(&self) -> Vec<Lifecycle> {
        self.recorded.lock().unwrap().events.clone()
    }
}

impl AlarmSink for RecordingSink {
    fn fired(&self, alarm: &AlarmEntry) {
        self.recorded
            .lock()
            .unwrap()
            .fired
            .push((alarm.notice(), Instant::now()));
        self.changed.notify_all();
    }

    fn lifecycle(&self, event: &Lifecycle) {
        self.recorded.lock().unwrap().events.push(event.clone());
        self.changed.notify_all();
    }
}
