use std::sync::{Arc, Mutex};
use std::thread;

use super::{fast_registry, msg, RecordingSink, UNIT};
use crate::entry::{AlarmEntry, AlarmId};
use crate::sink::{AlarmSink, Lifecycle};
use crate::worker::{TimerWorker, WorkerReport};

#[test]
fn worker_delivers_fires_exactly_once() {
    let registry = fast_registry();
    let sink = RecordingSink::new();
    let handle = TimerWorker::new(Arc::clone(&registry), sink.clone())
        .spawn()
        .unwrap();

    registry.insert(AlarmId(7), 2, msg("hello")).unwrap();
    let fired = sink.wait_for_fires(1);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].id, AlarmId(7));
    assert_eq!(fired[0].delay_seconds, 2);
    assert_eq!(fired[0].message.as_str(), "hello");

    // Nothing else shows up afterwards.
    thread::sleep(UNIT * 5);
    assert_eq!(sink.fired_notices().len(), 1);

    let report = handle.shutdown().unwrap();
    assert_eq!(report, WorkerReport { fired: 1, discarded: 0 });
}

#[test]
fn worker_fires_in_due_order() {
    let registry = fast_registry();
    let sink = RecordingSink::new();
    let handle = TimerWorker::new(Arc::clone(&registry), sink.clone())
        .spawn()
        .unwrap();

    for (id, delay) in [(5, 6), (2, 2), (9, 4), (1, 8)] {
        registry.insert(AlarmId(id), delay, msg("tick")).unwrap();
    }

    let ids: Vec<u32> = sink.wait_for_fires(4).iter().map(|n| n.id.0).collect();
    assert_eq!(ids, vec![2, 9, 5, 1]);
    let times = sink.fire_times();
    assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));

    handle.shutdown().unwrap();
}

#[test]
fn cancelled_alarm_is_reported_as_discarded() {
    let registry = fast_registry();
    let sink = RecordingSink::new();
    let handle = TimerWorker::new(Arc::clone(&registry), sink.clone())
        .spawn()
        .unwrap();

    registry.insert(AlarmId(1), 2, msg("skip me")).unwrap();
    registry.insert(AlarmId(2), 4, msg("keep me")).unwrap();
    registry.cancel(AlarmId(1)).unwrap();

    let fired = sink.wait_for_fires(1);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].id, AlarmId(2));
    assert!(sink
        .events()
        .iter()
        .any(|event| matches!(event, Lifecycle::Discarded(notice) if notice.id == AlarmId(1))));

    let report = handle.shutdown().unwrap();
    assert_eq!(report, WorkerReport { fired: 1, discarded: 1 });
}

#[test]
fn closure_sink_receives_fires() {
    let registry = fast_registry();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let probe = Arc::clone(&seen);
    let sink: Arc<dyn AlarmSink> = Arc::new(move |alarm: &AlarmEntry| {
        probe.lock().unwrap().push(alarm.id());
    });

    registry.insert(AlarmId(3), 1, msg("closure")).unwrap();
    let worker = TimerWorker::new(Arc::clone(&registry), sink);
    let runner = thread::spawn(move || worker.run());

    thread::sleep(UNIT * 5);
    registry.close();
    let report = runner.join().unwrap();

    assert_eq!(report.fired, 1);
    assert_eq!(seen.lock().unwrap().as_slice(), &[AlarmId(3)]);
}

#[test]
fn shutdown_abandons_pending_alarms() {
    let registry = fast_registry();
    let sink = RecordingSink::new();
    let handle = TimerWorker::new(Arc::clone(&registry), sink.clone())
        .spawn()
        .unwrap();

    registry.insert(AlarmId(1), 1_000, msg("far away")).unwrap();
    assert!(!handle.is_finished());
    let report = handle.shutdown().unwrap();

    assert_eq!(report, WorkerReport::default());
    assert!(sink.fired_notices().is_empty());
    assert!(registry.is_closed());
}
